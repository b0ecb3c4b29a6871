use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Name of the AWS region that the cluster is in
    #[clap(short, long, global = true, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS profile to use for authentication
    #[clap(short, long, global = true, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Log token cache and transport decisions
    #[clap(short, long, global = true, env = "DEBUG_LOG", action = ArgAction::SetTrue)]
    pub debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the namespaces of an EKS cluster
    ListNamespaces(ListNamespacesArgs),

    /// Print an ExecCredential with a token for an EKS cluster
    Token(TokenArgs),
}

#[derive(Args, Debug)]
pub struct ListNamespacesArgs {
    /// Name of the EKS Kubernetes cluster
    pub cluster_name: String,

    /// Reuse the cached token until it is close to expiring
    #[clap(long, env = "REUSE_TOKEN", action = ArgAction::Set, default_value_t = false)]
    pub reuse_token: bool,

    /// Seconds before expiration at which a reused token is refreshed
    #[clap(long, env = "REFRESH_EARLIER", default_value_t = 10)]
    pub refresh_earlier: u64,

    /// How many times to list the namespaces
    #[clap(short = 'n', long, default_value_t = 3)]
    pub iterations: u32,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Name of the EKS Kubernetes cluster to get a token for
    pub cluster_name: String,
}
