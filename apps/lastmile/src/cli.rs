use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

use gateway_proto::Role;

use crate::config::DEFAULT_GATEWAY_URL;
use crate::telemetry::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "lastmile",
    about = "Realtime client for the last-mile ride-matching gateway",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "LASTMILE_GATEWAY_URL",
        default_value = DEFAULT_GATEWAY_URL,
        help = "Base URL of the gateway"
    )]
    pub gateway_url: String,

    #[arg(long, value_enum, help = "Sign in as a driver or a rider")]
    pub role: CliRole,

    #[arg(long, env = "LASTMILE_USER_ID", help = "User id announced to the gateway")]
    pub user_id: String,

    #[arg(long, help = "Display name announced to the gateway")]
    pub name: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum CliRole {
    Driver,
    Rider,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Driver => Role::Driver,
            CliRole::Rider => Role::Rider,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "LASTMILE_LOG_LEVEL",
        default_value_t = LogLevel::Info,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "LASTMILE_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}
