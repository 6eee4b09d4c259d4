use clap::{Parser, Subcommand};

/// proxydeck: terminal bridge and account automation for antigravity-claude-proxy.
#[derive(Parser, Debug)]
#[command(name = "proxydeck", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long)]
    pub config: Option<String>,

    /// Log filter override (e.g. `debug`, `proxydeck_pty=trace`).
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the WebSocket terminal bridge (default).
    Serve(ServeArgs),
    /// Probe the proxy and print its health and models.
    Status {
        /// Also fetch per-account limits.
        #[arg(long)]
        limits: bool,
    },
    /// List the accounts the proxy CLI knows about.
    Accounts,
    /// Add an account through the wizard in a bridge session.
    Add {
        /// Start with a fresh login instead of adding to existing accounts.
        #[arg(long)]
        fresh: bool,
        /// Bridge URL; defaults to the configured listener.
        #[arg(long)]
        url: Option<String>,
    },
    /// Remove an account by its number in `accounts`.
    Remove {
        number: usize,
        /// Bridge URL; defaults to the configured listener.
        #[arg(long)]
        url: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Interface to bind, overriding `[server] host`.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, overriding `[server] port`.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Extra environment for spawned shells, as KEY=VALUE. Repeatable.
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Also start the proxy as a child process and stop it on shutdown.
    #[arg(long)]
    pub start_proxy: bool,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Serve(ServeArgs::default()))
    }
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

pub fn parse() -> Args {
    Args::parse()
}
