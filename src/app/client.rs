use super::aws::{load_sdk_config, StsTokenGenerator};
use super::error::Error;
use super::token::{TokenCache, TokenSource, DEFAULT_REFRESH_EARLIER};
use super::transport::{HttpsTransport, TokenTransport, Transport};
use aws_config::SdkConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::header::ACCEPT;
use http::{Request, Response};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Connection settings for an EKS cluster.
#[derive(Clone, Default)]
pub struct Options {
    /// EKS cluster name, also the cluster id the tokens are issued for.
    pub cluster_name: String,

    /// Base64 encoded PEM bundle of the cluster CA.
    pub cluster_ca_data: String,

    /// `host`, `host:port` or a URL. A URL path is kept as a prefix for every
    /// request, which lets a proxy relocate the API server.
    pub cluster_endpoint: String,

    pub debug_log: bool,

    /// How long before expiration a reused token is refreshed. Defaults to 10s.
    pub refresh_earlier: Option<Duration>,

    /// Reuse a cached token until it is close to expiring instead of
    /// generating one per request.
    pub reuse_token: bool,

    /// Custom token source. When set, `refresh_earlier` and `reuse_token` are
    /// up to the source.
    pub source: Option<Arc<dyn TokenSource>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: Option<NamespaceStatus>,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamespaceStatus {
    #[serde(default)]
    pub phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamespaceList {
    items: Vec<Namespace>,
}

/// Kubernetes API client for an EKS cluster.
///
/// Every request goes through a [`TokenTransport`], so the bearer token is
/// refreshed as needed for the whole life of the client. Clones share the
/// same token source and connection pool.
#[derive(Clone)]
pub struct EksClient {
    base_url: Url,
    transport: Arc<dyn Transport>,
}

impl EksClient {
    /// Builds a client, loading the ambient AWS config for the default token
    /// generator when `options.source` is not set.
    pub async fn new(options: Options) -> Result<Self, Error> {
        let source = match options.source.clone() {
            Some(source) => source,
            None => default_source(&options, &load_sdk_config(None, None).await)?,
        };
        Self::build(&options, source)
    }

    pub fn from_sdk_config(options: Options, config: &SdkConfig) -> Result<Self, Error> {
        let source = match options.source.clone() {
            Some(source) => source,
            None => default_source(&options, config)?,
        };
        Self::build(&options, source)
    }

    fn build(options: &Options, source: Arc<dyn TokenSource>) -> Result<Self, Error> {
        if options.debug_log {
            debug!(
                cluster_name = %options.cluster_name,
                endpoint = %options.cluster_endpoint,
                ca = %options.cluster_ca_data,
                "building cluster client"
            );
        }

        let ca = decode_ca_data(&options.cluster_ca_data)?;
        let base_url = parse_endpoint(&options.cluster_endpoint)?;
        let transport =
            TokenTransport::new(source, HttpsTransport::new(&ca)?).debug_log(options.debug_log);

        Ok(Self {
            base_url,
            transport: Arc::new(transport),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends an authenticated request as is.
    pub async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        self.transport.send(request).await
    }

    /// GETs `path` below the endpoint, failing on any non-2xx status.
    pub async fn get(&self, path: &str) -> Result<Bytes, Error> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| Error::InvalidEndpoint {
                endpoint: path.to_string(),
                source,
            })?;

        let request = Request::get(url.as_str())
            .header(ACCEPT, "application/json")
            .body(Bytes::new())
            .map_err(|source| Error::FailedToBuildHttpRequest { source })?;

        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::ApiStatus {
                status,
                body: String::from_utf8_lossy(response.body()).into_owned(),
            });
        }
        Ok(response.into_body())
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>, Error> {
        let body = self.get("/api/v1/namespaces").await?;
        let list: NamespaceList =
            serde_json::from_slice(&body).map_err(|source| Error::DecodeResponse { source })?;
        Ok(list.items)
    }
}

fn default_source(options: &Options, config: &SdkConfig) -> Result<Arc<dyn TokenSource>, Error> {
    let generator = StsTokenGenerator::from_sdk_config(config)
        .map_err(|source| Error::InvalidAwsConfig { source })?;
    let cache = TokenCache::new(generator, options.cluster_name.clone())
        .reuse_token(options.reuse_token)
        .refresh_earlier(options.refresh_earlier.unwrap_or(DEFAULT_REFRESH_EARLIER))
        .debug_log(options.debug_log);
    Ok(Arc::new(cache))
}

/// Decodes the base64 CA bundle, ignoring line breaks.
fn decode_ca_data(data: &str) -> Result<Vec<u8>, Error> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|source| Error::InvalidCaData { source })
}

/// Turns `host`, `host:port` or a URL into a base URL ending in `/`.
fn parse_endpoint(endpoint: &str) -> Result<Url, Error> {
    let endpoint = endpoint.trim();
    let raw = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };

    let mut url = Url::parse(&raw).map_err(|source| Error::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
