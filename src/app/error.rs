use http::StatusCode;
use thiserror::Error;

/// Boxed error returned by pluggable collaborators such as token generators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Cluster CA data is not valid base64: {source}")]
    InvalidCaData { source: base64::DecodeError },

    #[error("Cluster CA data does not contain a usable PEM certificate: {source}")]
    InvalidCaCertificate { source: reqwest::Error },

    #[error("Cluster CA data does not contain any PEM certificate")]
    EmptyCaBundle,

    #[error("Cluster endpoint '{endpoint}' is not a valid URL: {source}")]
    InvalidEndpoint {
        endpoint: String,
        source: url::ParseError,
    },

    #[error("Failed to build the HTTP client for the cluster endpoint: {source}")]
    FailedToBuildHttpClient { source: reqwest::Error },

    #[error("AWS configuration cannot be used to generate EKS tokens: {source}")]
    InvalidAwsConfig {
        source: super::aws::GenerateTokenError,
    },

    #[error("Failed to generate a token for the EKS cluster: {source}")]
    TokenGenerationFailed { source: BoxError },

    #[error("Token is not a valid Authorization header value: {source}")]
    InvalidTokenHeader {
        source: http::header::InvalidHeaderValue,
    },

    #[error("Failed to build HTTP request for the cluster API: {source}")]
    FailedToBuildHttpRequest { source: http::Error },

    #[error("Request to the cluster API failed: {source}")]
    RequestFailed { source: reqwest::Error },

    #[error("Cluster API returned {status}: {body}")]
    ApiStatus { status: StatusCode, body: String },

    #[error("Failed to decode cluster API response: {source}")]
    DecodeResponse { source: serde_json::Error },

    #[error("Failed to describe EKS cluster '{cluster_name}': {source}")]
    DescribeCluster {
        cluster_name: String,
        source: Box<aws_sdk_eks::Error>,
    },

    #[error("EKS cluster '{cluster_name}' description has no {field}")]
    ClusterDataMissing {
        cluster_name: String,
        field: &'static str,
    },
}
