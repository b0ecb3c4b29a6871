use super::error::Error;
use super::token::TokenSource;
use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderValue, AUTHORIZATION};
use http::{Request, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Sends a request to the cluster API and returns the buffered response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        (**self).send(request).await
    }
}

/// HTTPS transport that trusts only the cluster's own CA bundle.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
}

impl HttpsTransport {
    pub fn new(ca_pem: &[u8]) -> Result<Self, Error> {
        let certificates = reqwest::Certificate::from_pem_bundle(ca_pem)
            .map_err(|source| Error::InvalidCaCertificate { source })?;
        if certificates.is_empty() {
            return Err(Error::EmptyCaBundle);
        }

        let builder = certificates.into_iter().fold(
            reqwest::Client::builder()
                .use_rustls_tls()
                .tls_built_in_root_certs(false),
            |builder, certificate| builder.add_root_certificate(certificate),
        );

        let client = builder
            .build()
            .map_err(|source| Error::FailedToBuildHttpClient { source })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let request = reqwest::Request::try_from(request)
            .map_err(|source| Error::RequestFailed { source })?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|source| Error::RequestFailed { source })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| Error::RequestFailed { source })?;

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Stamps a bearer token from `source` onto every request before handing it
/// to the wrapped transport.
///
/// The token is looked up per request, so a long lived client keeps working
/// after the token it started with has expired. No request leaves without a
/// successful lookup, and nothing is retried here.
pub struct TokenTransport<T> {
    source: Arc<dyn TokenSource>,
    transport: T,
    debug_log: bool,
}

impl<T: Transport> TokenTransport<T> {
    pub fn new(source: Arc<dyn TokenSource>, transport: T) -> Self {
        Self {
            source,
            transport,
            debug_log: false,
        }
    }

    pub fn debug_log(mut self, debug_log: bool) -> Self {
        self.debug_log = debug_log;
        self
    }
}

#[async_trait]
impl<T: Transport> Transport for TokenTransport<T> {
    async fn send(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>, Error> {
        let begin = Instant::now();

        let token = self.source.get().await?;

        if self.debug_log {
            debug!(elapsed = ?begin.elapsed(), "token lookup");
        }

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.value))
            .map_err(|source| Error::InvalidTokenHeader { source })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.transport.send(request).await
    }
}
