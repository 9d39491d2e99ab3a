pub mod config;
pub mod entity;
pub mod error;
pub mod telemetry;

pub use config::EngineConfig;
pub use entity::*;
pub use error::*;
