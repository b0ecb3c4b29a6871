use super::error::Error;
use async_trait::async_trait;
use aws_config::SdkConfig;

/// What the client needs to know to reach a cluster's API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub endpoint: String,
    /// Base64 encoded PEM bundle.
    pub ca_data: String,
}

#[async_trait]
pub trait ClusterDescriptor: Send + Sync {
    async fn describe(&self, cluster_name: &str) -> Result<ClusterInfo, Error>;
}

/// Looks clusters up with EKS `DescribeCluster`.
#[derive(Debug, Clone)]
pub struct EksClusterDescriptor {
    client: aws_sdk_eks::Client,
}

impl EksClusterDescriptor {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_eks::Client::new(config),
        }
    }

    pub fn from_client(client: aws_sdk_eks::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterDescriptor for EksClusterDescriptor {
    async fn describe(&self, cluster_name: &str) -> Result<ClusterInfo, Error> {
        let response = self
            .client
            .describe_cluster()
            .name(cluster_name)
            .send()
            .await
            .map_err(|source| Error::DescribeCluster {
                cluster_name: cluster_name.to_string(),
                source: Box::new(source.into()),
            })?;

        let missing = |field| Error::ClusterDataMissing {
            cluster_name: cluster_name.to_string(),
            field,
        };

        let cluster = response.cluster.ok_or_else(|| missing("cluster"))?;
        let endpoint = cluster.endpoint.ok_or_else(|| missing("endpoint"))?;
        let ca_data = cluster
            .certificate_authority
            .and_then(|ca| ca.data)
            .ok_or_else(|| missing("certificate authority data"))?;

        Ok(ClusterInfo { endpoint, ca_data })
    }
}
