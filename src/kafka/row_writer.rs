use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rdkafka::error::KafkaError;
use tracing::{debug, error, trace};

use super::error_state::ErrorState;
use super::producer::RecordProducer;
use super::projection::Projection;
use super::record::BrokerRecord;
use crate::error::WriteError;
use crate::schema::InputRow;

/// State reachable from delivery callbacks.
#[derive(Debug, Default)]
struct Deliveries {
    errors: ErrorState,
    acknowledged: AtomicU64,
    failed: AtomicU64,
}

impl Deliveries {
    fn complete(&self, outcome: Result<(), KafkaError>) {
        match outcome {
            Ok(()) => {
                self.acknowledged.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if self.errors.try_set(WriteError::Delivery(e.clone())) {
                    error!(error = %e, "Delivery failed");
                } else {
                    debug!(error = %e, "Dropping delivery failure, an earlier one was captured");
                }
            }
        }
    }
}

/// Turns rows into broker records and tracks how their deliveries end.
#[derive(Debug)]
pub struct RowWriter {
    projection: Projection,
    deliveries: Arc<Deliveries>,
}

impl RowWriter {
    pub fn new(projection: Projection) -> Self {
        Self {
            projection,
            deliveries: Arc::new(Deliveries::default()),
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Projects `row` and hands it to `producer` without waiting for the
    /// broker. Rows whose topic resolves to null fail here and never reach
    /// the producer.
    pub fn send_row(
        &self,
        row: &InputRow,
        producer: &dyn RecordProducer,
    ) -> Result<(), WriteError> {
        let projected = self.projection.project(row)?;
        let record = BrokerRecord::try_from(projected)?;
        trace!(topic = %record.topic, partition = ?record.partition, "Sending row");

        let deliveries = Arc::clone(&self.deliveries);
        producer.send(record, Box::new(move |outcome| deliveries.complete(outcome)))
    }

    /// Returns the first captured failure, if any. Does not clear it.
    pub fn check_for_errors(&self) -> Result<(), WriteError> {
        self.deliveries.errors.check()
    }

    pub fn has_failed(&self) -> bool {
        self.deliveries.errors.is_set()
    }

    /// Records a failure observed outside of a delivery callback.
    pub fn record_failure(&self, error: WriteError) -> bool {
        self.deliveries.errors.try_set(error)
    }

    pub fn acknowledged(&self) -> u64 {
        self.deliveries.acknowledged.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.deliveries.failed.load(Ordering::Relaxed)
    }

    pub fn discarded_failures(&self) -> u64 {
        self.deliveries.errors.discarded()
    }
}
