pub mod config;
pub mod csv;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod telemetry;

pub use config::Settings;
pub use error::{Error, Result};
