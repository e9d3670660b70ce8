pub mod cli;
pub mod config;
pub mod rest;
pub mod session;
pub mod state;
pub mod telemetry;

pub use config::GatewayConfig;
pub use session::{Identity, RealtimeSession, SessionError};
pub use state::SessionState;
