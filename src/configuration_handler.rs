use crate::configuration::Configuration;
use clap::Parser;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "slot_manager",
    about = "Time slot registration service with live updates"
)]
pub struct ConfigurationHandler {
    /// Port the HTTP server listens on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// PostgreSQL connection URL. Without it slots are kept in memory only
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of pooled database connections
    #[arg(
        long,
        env = "DATABASE_POOL_SIZE",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pool_size: u32,

    /// Password expected in the `x-admin-password` header of admin requests
    #[arg(
        long,
        env = "ADMIN_PASSWORD",
        value_parser = clap::builder::NonEmptyStringValueParser::new()
    )]
    admin_password: Option<String>,

    /// Seconds between keep-alive messages on live update streams
    #[arg(
        long,
        env = "KEEP_ALIVE_SECS",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    keep_alive_secs: u64,

    /// Insert a few example slots on startup
    #[arg(long, env = "SEED_EXAMPLES")]
    seed_examples: bool,
}

impl ConfigurationHandler {
    pub fn parse_arguments() -> Self {
        Self::parse()
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> u16 {
        self.port
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn pool_size(&self) -> u32 {
        self.pool_size
    }

    fn admin_password(&self) -> Option<String> {
        self.admin_password.clone()
    }

    fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    fn seed_examples(&self) -> bool {
        self.seed_examples
    }
}
