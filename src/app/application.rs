use super::aws::{load_sdk_config, ExecCredential, StsTokenGenerator};
use super::cli::{CliArgs, Command, ListNamespacesArgs, TokenArgs};
use super::client::{EksClient, Options};
use super::eks::{ClusterDescriptor, EksClusterDescriptor};
use super::token::{TokenCache, TokenSource};
use anyhow::Result;
use aws_config::SdkConfig;
use clap::Parser;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.debug);

    let config = load_sdk_config(args.region.as_deref(), args.profile.as_deref()).await;

    match args.command {
        Command::ListNamespaces(list) => list_namespaces(&config, list, args.debug).await,
        Command::Token(token) => print_token(&config, token).await,
    }
}

fn init_tracing(debug: bool) {
    let default = if debug {
        "info,eksclient=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn list_namespaces(config: &SdkConfig, args: ListNamespacesArgs, debug: bool) -> Result<()> {
    info!(
        reuse_token = args.reuse_token,
        refresh_earlier = args.refresh_earlier,
        "eksclient"
    );

    let cluster = EksClusterDescriptor::new(config)
        .describe(&args.cluster_name)
        .await?;

    info!(cluster_name = %args.cluster_name, "clusterName");
    info!(cluster_ca_data = %cluster.ca_data, "clusterCAData");
    info!(cluster_endpoint = %cluster.endpoint, "clusterEndpoint");

    let options = Options {
        cluster_name: args.cluster_name,
        cluster_ca_data: cluster.ca_data,
        cluster_endpoint: cluster.endpoint,
        debug_log: debug,
        refresh_earlier: Some(Duration::from_secs(args.refresh_earlier)),
        reuse_token: args.reuse_token,
        source: None,
    };
    let client = EksClient::from_sdk_config(options, config)?;

    let mut stdout = tokio::io::stdout();
    for i in 0..args.iterations {
        stdout
            .write_all(format!("listing namespaces {}:\n", i + 1).as_bytes())
            .await?;

        let namespaces = client.list_namespaces().await?;
        info!("found {} namespaces", namespaces.len());

        for namespace in &namespaces {
            stdout
                .write_all(format!("{}\n", namespace.name()).as_bytes())
                .await?;
        }
    }
    stdout.flush().await?;
    Ok(())
}

async fn print_token(config: &SdkConfig, args: TokenArgs) -> Result<()> {
    let cache = TokenCache::new(
        StsTokenGenerator::from_sdk_config(config)?,
        args.cluster_name,
    );
    let token = cache.get().await?;
    let creds = serde_json::to_string(&ExecCredential::from(&token))?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(creds.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
