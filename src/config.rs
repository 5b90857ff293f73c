use crate::service::ProbeSettings;
use clap::{ArgAction, Parser};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Process settings, read from flags or the environment.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "mcstatus",
    about = "HTTP API reporting Minecraft Java and Bedrock server status",
    version
)]
pub struct Config {
    /// Address the HTTP API binds to
    #[arg(long, env = "LISTEN_IP", default_value = "0.0.0.0")]
    pub listen_ip: IpAddr,

    /// HTTP API port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Roster file, one `name=host:port[:type[:srv]]` per line
    #[arg(long, env = "SERVERS_FILE", default_value = "config/servers.txt")]
    pub servers_file: PathBuf,

    /// Serve repeated lookups from the TTL cache
    #[arg(long, env = "CACHE_ENABLED", default_value_t = true, action = ArgAction::Set)]
    pub cache_enabled: bool,

    /// Lifetime of a cached status record, in milliseconds
    #[arg(long, env = "CACHE_TTL_MS", default_value_t = 60_000)]
    pub cache_ttl_ms: u64,

    /// Interval between expired-entry sweeps, in seconds
    #[arg(
        long,
        env = "CACHE_SWEEP_SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub cache_sweep_secs: u64,

    /// Deadline for one status exchange, in milliseconds
    #[arg(
        long,
        env = "PROBE_TIMEOUT_MS",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub probe_timeout_ms: u64,

    /// Deadline for an SRV lookup, in milliseconds
    #[arg(
        long,
        env = "SRV_TIMEOUT_MS",
        default_value_t = 2_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub srv_timeout_ms: u64,

    /// Shared secret for the admin endpoints; unset disables them
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    pub admin_token: Option<String>,
}

impl Config {
    /// Parse configuration from command-line arguments and the environment.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_secs)
    }

    pub fn srv_timeout(&self) -> Duration {
        Duration::from_millis(self.srv_timeout_ms)
    }

    /// The admin token, treating an empty value as unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().filter(|token| !token.is_empty())
    }

    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            srv_timeout: self.srv_timeout(),
            cache_enabled: self.cache_enabled,
        }
    }
}
