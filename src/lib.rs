pub mod config;
pub mod error;
pub mod pipeline;

pub mod kafka;
pub mod schema;

pub use crate::config::Config;
pub use error::{Error, Result, WriteError};
pub use pipeline::Pipeline;
