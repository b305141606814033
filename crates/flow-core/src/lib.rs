pub mod config;
pub mod types;

pub use config::{ConfigError, FlowConfig, parse_duration};
pub use types::*;
