use super::error::BoxError;
use super::token::{Token, TokenGenerator};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SignatureLocation, SigningSettings,
};
use aws_smithy_runtime_api::client::identity::Identity;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";
const TOKEN_PREFIX: &str = "k8s-aws-v1.";

/// EKS accepts a presigned token for 15 minutes; one of them is left for skew.
const TOKEN_LIFETIME_MINUTES: i64 = 14;

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecCredential {
    pub kind: String,
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub spec: HashMap<String, ()>,
    pub status: ExecCredentialStatus,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExecCredentialStatus {
    #[serde(rename = "expirationTimestamp")]
    pub expiration_timestamp: String,
    pub token: String,
}

impl From<&Token> for ExecCredential {
    fn from(token: &Token) -> Self {
        ExecCredential {
            kind: "ExecCredential".to_string(),
            api_version: "client.authentication.k8s.io/v1beta1".to_string(),
            spec: HashMap::new(),
            status: ExecCredentialStatus {
                expiration_timestamp: token
                    .expiration
                    .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                token: token.value.clone(),
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum GenerateTokenError {
    #[error(
        "Credentials provider was None when trying to get credentials from the AWS shared config"
    )]
    CredentialsProviderNone,

    #[error("AWS region is not configured. Pass --region or set AWS_REGION.")]
    RegionNone,

    #[error("Unable to get credentials from the AWS credentials provider: {source}")]
    CredentialsProviderError {
        source: aws_credential_types::provider::error::CredentialsError,
    },

    #[error(
        "Failed to build the signing params for signing the authenticating with EKS: {source}"
    )]
    FailedToBuildSigningParams {
        source: aws_sigv4::sign::v4::signing_params::BuildError,
    },

    #[error("Failed to build HTTP request for authenticating to EKS: {source}")]
    FailedToBuildHttpRequest { source: http::Error },

    #[error("Failed to create signable request to sign EKS authentication request: {source}")]
    FailedToCreateSignableRequest {
        source: aws_sigv4::http_request::SigningError,
    },

    #[error("Failed to sign HTTP request for authenticating against EKS cluster: {source}")]
    FailedToSignHttpRequest {
        source: aws_sigv4::http_request::SigningError,
    },
}

/// Loads the shared AWS config, optionally pinned to a region and profile.
pub async fn load_sdk_config(region: Option<&str>, profile: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    loader.load().await
}

/// Generates EKS bearer tokens from a presigned STS `GetCallerIdentity` URL.
#[derive(Debug, Clone)]
pub struct StsTokenGenerator {
    credentials: SharedCredentialsProvider,
    region: String,
}

impl StsTokenGenerator {
    pub fn new(credentials: SharedCredentialsProvider, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Result<Self, GenerateTokenError> {
        let credentials = config
            .credentials_provider()
            .ok_or(GenerateTokenError::CredentialsProviderNone)?;
        let region = config.region().ok_or(GenerateTokenError::RegionNone)?;
        Ok(Self::new(credentials, region.to_string()))
    }

    pub async fn get_eks_token(&self, cluster_id: &str) -> Result<Token, GenerateTokenError> {
        let identity: Identity = self
            .credentials
            .provide_credentials()
            .await
            .map_err(|source| GenerateTokenError::CredentialsProviderError { source })?
            .into();

        let mut signing_settings = SigningSettings::default();
        signing_settings.signature_location = SignatureLocation::QueryParams;
        signing_settings.expires_in = Some(Duration::from_secs(60));
        let request_ts = Utc::now();
        let signing_params = aws_sigv4::sign::v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name("sts")
            .time(request_ts.into())
            .settings(signing_settings)
            .build()
            .map_err(|source| GenerateTokenError::FailedToBuildSigningParams { source })?
            .into();

        let uri = format!(
            "https://sts.{}.amazonaws.com/?Action=GetCallerIdentity&Version=2011-06-15",
            &self.region
        );

        let mut request = http::Request::builder()
            .uri(&uri)
            .header(CLUSTER_ID_HEADER, cluster_id)
            .body(())
            .map_err(|source| GenerateTokenError::FailedToBuildHttpRequest { source })?;

        let signable_request = SignableRequest::new(
            "GET",
            uri,
            [(CLUSTER_ID_HEADER, cluster_id)].into_iter(),
            SignableBody::Bytes(&[]),
        )
        .map_err(|source| GenerateTokenError::FailedToCreateSignableRequest { source })?;

        let (signing_instructions, _signature) = sign(signable_request, &signing_params)
            .map_err(|source| GenerateTokenError::FailedToSignHttpRequest { source })?
            .into_parts();

        signing_instructions.apply_to_request_http1x(&mut request);

        let value = format!(
            "{TOKEN_PREFIX}{}",
            URL_SAFE_NO_PAD.encode(request.uri().to_string())
        );

        Ok(Token::new(
            value,
            request_ts + TimeDelta::minutes(TOKEN_LIFETIME_MINUTES),
        ))
    }
}

#[async_trait]
impl TokenGenerator for StsTokenGenerator {
    async fn generate(&self, cluster_id: &str) -> Result<Token, BoxError> {
        Ok(self.get_eks_token(cluster_id).await?)
    }
}
