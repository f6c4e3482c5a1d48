//! Error types and result handling for kafka-row-sink.
//!
//! This module defines the crate-wide error type [`Error`], the per-task
//! [`WriteError`] captured while rows are being written, and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use kafka_row_sink::{Error, Result};
//!
//! fn load_schema() -> Result<()> {
//!     Err(Error::Config("required attribute 'value' not found".to_string()))
//! }
//!
//! match load_schema() {
//!     Ok(()) => println!("Schema accepted"),
//!     Err(Error::Config(msg)) => eprintln!("Configuration error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use rdkafka::error::KafkaError;
use thiserror::Error;

use crate::schema::DataType;

/// The main error type for kafka-row-sink operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid schema or sink options, raised before any row is read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file or environment could not be loaded.
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// Kafka client error outside of a write task, e.g. producer creation.
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Failure while writing rows through a task.
    #[error(transparent)]
    Write(#[from] WriteError),

    /// JSON error while reading input rows.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error, typically from reading input files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An input line could not be decoded into a row.
    #[error("Invalid row at line {line}: {message}")]
    RowDecode {
        /// 1-based line number in the input
        line: usize,
        /// Description of what was invalid
        message: String,
    },
}

/// Failures observed while a write task is running.
///
/// These are cheap to clone so that the first captured failure can be
/// re-raised by every later check without being consumed.
#[derive(Error, Debug, Clone)]
pub enum WriteError {
    /// A row produced a null topic and no topic override was configured.
    #[error("null topic present in the data; use the topic option to set a default topic")]
    NullTopic,

    /// A row held null in its `value` attribute.
    #[error("null value present in the data; the value attribute is required")]
    NullValue,

    /// A row did not hold the type its schema declared.
    #[error("row does not match schema: attribute '{field}' is not of type {expected}")]
    RowMismatch {
        /// Attribute whose value had the wrong shape
        field: String,
        /// Type declared by the schema
        expected: DataType,
    },

    /// The producer refused to enqueue a record.
    #[error("failed to enqueue record: {0}")]
    Enqueue(KafkaError),

    /// The broker reported a failed delivery through a completion callback.
    #[error("delivery failed: {0}")]
    Delivery(KafkaError),

    /// Flushing outstanding records failed or timed out.
    #[error("flush failed: {0}")]
    Flush(KafkaError),

    /// The task was already closed and no earlier failure was recorded.
    #[error("write task is already closed")]
    TaskClosed,
}

/// A convenient Result type alias for kafka-row-sink operations.
///
/// This is equivalent to `std::result::Result<T, kafka_row_sink::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
