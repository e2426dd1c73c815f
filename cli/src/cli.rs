use clap::{ArgGroup, Args, Parser, Subcommand};
use engine::DeploymentRing;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "csmauth")]
#[command(about = "Sign in once and get resource manager tokens for every tenant you belong to")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./csmauth.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Interactive sign-in, then cache a token for every reachable tenant
    Login {
        /// Deployment ring (Ring0, Ring1, Ring2, Production or a legacy name)
        #[arg(long = "env", value_name = "RING")]
        ring: Option<DeploymentRing>,
    },
    /// Sign in as a service principal with an application key
    LoginSpn(LoginSpnArgs),
    /// Delete every cached file
    Clear,
    /// Print the cached users, tenants and subscriptions
    Dump,
    /// Print an authorization header for a tenant, a subscription or the recent credential
    Token(TokenArgs),
    /// Exit with 0 when someone has signed in, 1 otherwise
    Status,
}

#[derive(Args, Debug)]
pub struct LoginSpnArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub app_id: String,
    #[arg(long)]
    pub app_key: String,
    #[arg(long = "env", value_name = "RING")]
    pub ring: Option<DeploymentRing>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["tenant", "subscription", "recent"])))]
pub struct TokenArgs {
    /// Tenant id or domain
    #[arg(long)]
    pub tenant: Option<String>,
    #[arg(long)]
    pub subscription: Option<String>,
    /// Use the most recently used credential
    #[arg(long)]
    pub recent: bool,
}

/// What a `token` invocation asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenTarget {
    Tenant(String),
    Subscription(String),
    Recent,
}

impl TokenArgs {
    pub fn target(&self) -> TokenTarget {
        match (&self.tenant, &self.subscription) {
            (Some(tenant), _) => TokenTarget::Tenant(tenant.clone()),
            (None, Some(subscription)) => TokenTarget::Subscription(subscription.clone()),
            (None, None) => TokenTarget::Recent,
        }
    }
}
