use std::thread;
use std::time::Duration;

use rdkafka::config::RDKafkaLogLevel;
use rdkafka::error::KafkaError;
use rdkafka::message::{DeliveryResult, Header, OwnedHeaders};
use rdkafka::producer::{BaseRecord, Producer, ProducerContext, ThreadedProducer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, ClientContext};
use tracing::{debug, error, info, warn};

use super::pool::ProducerConfig;
use super::record::{BrokerRecord, RecordHeader};
use crate::error::WriteError;
use crate::Result;

/// Pause before resubmitting a record the local queue had no room for.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Invoked once with the delivery outcome of a record, on whatever thread
/// the producer reports deliveries from.
pub type DeliveryCallback = Box<dyn FnOnce(std::result::Result<(), KafkaError>) + Send + Sync>;

/// A broker client handle that writes records asynchronously.
pub trait RecordProducer: Send + Sync {
    /// Enqueues `record` without waiting for the broker. `on_complete` runs
    /// later with the delivery outcome. When this returns an error the
    /// record was not enqueued and `on_complete` is never called.
    fn send(&self, record: BrokerRecord, on_complete: DeliveryCallback)
        -> std::result::Result<(), WriteError>;

    /// Blocks until every record sent so far has completed.
    fn flush(&self) -> std::result::Result<(), WriteError>;
}

/// Routes delivery reports to their callbacks and librdkafka logs to tracing.
pub struct SinkProducerContext;

impl ClientContext for SinkProducerContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => error!(facility = fac, "{}", log_message),
            RDKafkaLogLevel::Warning => warn!(facility = fac, "{}", log_message),
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => {
                info!(facility = fac, "{}", log_message)
            }
            RDKafkaLogLevel::Debug => debug!(facility = fac, "{}", log_message),
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        error!(%error, reason, "Kafka client error");
    }
}

impl ProducerContext for SinkProducerContext {
    type DeliveryOpaque = Box<DeliveryCallback>;

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, on_complete: Self::DeliveryOpaque) {
        let outcome = match delivery_result {
            Ok(_) => Ok(()),
            Err((error, _message)) => Err(error.clone()),
        };
        on_complete(outcome);
    }
}

/// [`RecordProducer`] backed by an rdkafka [`ThreadedProducer`], whose
/// background thread polls for delivery reports.
pub struct KafkaProducer {
    producer: ThreadedProducer<SinkProducerContext>,
    flush_timeout: Timeout,
}

impl KafkaProducer {
    pub fn new(config: &ProducerConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        for (key, value) in config.properties() {
            client_config.set(key, value);
        }

        let producer: ThreadedProducer<SinkProducerContext> =
            client_config.create_with_context(SinkProducerContext)?;

        info!(
            brokers = config.get("bootstrap.servers").unwrap_or("<unset>"),
            "Created Kafka producer"
        );

        Ok(Self {
            producer,
            flush_timeout: config
                .flush_timeout()
                .map_or(Timeout::Never, Timeout::After),
        })
    }
}

fn owned_headers(headers: &[RecordHeader]) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, h| {
            acc.insert(Header {
                key: h.key.as_str(),
                value: h.value.as_deref(),
            })
        })
}

impl RecordProducer for KafkaProducer {
    fn send(
        &self,
        record: BrokerRecord,
        on_complete: DeliveryCallback,
    ) -> std::result::Result<(), WriteError> {
        let mut base: BaseRecord<'_, [u8], [u8], Box<DeliveryCallback>> =
            BaseRecord::with_opaque_to(&record.topic, Box::new(on_complete))
                .payload(&record.value[..]);
        if let Some(key) = record.key.as_deref() {
            base = base.key(key);
        }
        if let Some(partition) = record.partition {
            base = base.partition(partition);
        }
        if !record.headers.is_empty() {
            base = base.headers(owned_headers(&record.headers));
        }

        loop {
            match self.producer.send(base) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    debug!(topic = %record.topic, "Producer queue full, waiting for room");
                    base = returned;
                    thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((error, _)) => return Err(WriteError::Enqueue(error)),
            }
        }
    }

    fn flush(&self) -> std::result::Result<(), WriteError> {
        self.producer
            .flush(self.flush_timeout)
            .map_err(WriteError::Flush)
    }
}
