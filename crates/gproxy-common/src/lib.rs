pub mod config;
pub mod error;
pub mod loader;

pub use config::{
    ApiKeyCredential, ApiKeyRecord, Engine, GatewayConfig, Preferences, Provider, Role,
};
pub use error::ConfigError;
pub use loader::load as load_config;
