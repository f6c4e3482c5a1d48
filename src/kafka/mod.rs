pub mod error_state;
pub mod pool;
pub mod producer;
pub mod projection;
pub mod record;
pub mod row_writer;
pub mod write_task;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error_state::ErrorState;
pub use pool::{KafkaProducerCache, ProducerConfig, ProducerPool};
pub use producer::{DeliveryCallback, KafkaProducer, RecordProducer};
pub use projection::{FieldResolution, Projection, ProjectionBuilder, SinkAttribute, Source};
pub use record::{BrokerRecord, ProjectedRow, RecordHeader};
pub use row_writer::RowWriter;
pub use write_task::{TaskState, WriteTask};
