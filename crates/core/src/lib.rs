pub mod config;
pub mod error;
pub mod telemetry;

pub use config::{ApiSettings, Settings};
pub use error::AppError;
