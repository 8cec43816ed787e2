pub mod config;
pub mod error;
pub mod module;
pub mod time;

pub use config::{ConfigError, DEFAULT_PORT, ServiceConfig, StorageTarget};
pub use error::{ServiceError, ValidationDetails, route_not_found};
pub use module::Module;
pub use time::{Clock, FixedClock, SystemClock, TimeSource, format_instant, parse_instant};
