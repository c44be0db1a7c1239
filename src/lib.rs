pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod query;

pub use error::{BridgeError, Result};
