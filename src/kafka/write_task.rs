//! Drives rows through a [`RowWriter`] and owns the flush barrier.
//!
//! A [`WriteTask`] borrows one producer handle from a [`ProducerPool`] for
//! its whole lifetime. [`WriteTask::execute`] sends rows without waiting for
//! the broker; [`WriteTask::close`] flushes and reports the first failure.
//! Rows are only known to be stored once `close` has returned `Ok`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kafka_row_sink::kafka::{KafkaProducerCache, ProducerConfig, WriteTask};
//! use kafka_row_sink::schema::{DataType, Field, InputRow, Schema, Value};
//!
//! # fn example() -> kafka_row_sink::Result<()> {
//! let schema = Schema::new(vec![
//!     Field::new("topic", DataType::String),
//!     Field::new("value", DataType::Binary),
//! ]);
//! let config = ProducerConfig::new().set("bootstrap.servers", "localhost:9092");
//! let mut task = WriteTask::new(Arc::new(KafkaProducerCache::new()), config, &schema, None)?;
//!
//! let rows = vec![InputRow::new(vec![Value::string("events"), Value::binary(vec![1u8])])];
//! let executed = task.execute(rows);
//! let closed = task.close();
//! executed?;
//! closed?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::pool::{ProducerConfig, ProducerPool};
use super::producer::RecordProducer;
use super::projection::Projection;
use super::row_writer::RowWriter;
use crate::error::WriteError;
use crate::schema::{InputRow, Schema};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created, nothing sent yet.
    Idle,
    /// Rows are being pulled and sent.
    Sending,
    /// The row source was exhausted; deliveries may still be outstanding.
    Sent,
    /// Flushed with no failure.
    Closed,
    /// A failure was observed and propagated.
    Aborted,
}

pub struct WriteTask {
    pool: Arc<dyn ProducerPool>,
    producer_config: ProducerConfig,
    writer: RowWriter,
    producer: Option<Arc<dyn RecordProducer>>,
    state: TaskState,
    rows_sent: u64,
}

impl WriteTask {
    /// Validates `schema` and prepares a task. Schema problems surface here
    /// as [`Error::Config`](crate::Error::Config), before any row is read.
    pub fn new(
        pool: Arc<dyn ProducerPool>,
        producer_config: ProducerConfig,
        schema: &Schema,
        topic_override: Option<String>,
    ) -> Result<Self> {
        let projection = Projection::build(schema, topic_override)?;
        Ok(Self::with_projection(pool, producer_config, projection))
    }

    pub fn with_projection(
        pool: Arc<dyn ProducerPool>,
        producer_config: ProducerConfig,
        projection: Projection,
    ) -> Self {
        Self {
            pool,
            producer_config,
            writer: RowWriter::new(projection),
            producer: None,
            state: TaskState::Idle,
            rows_sent: 0,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Rows handed to the producer so far.
    pub fn rows_sent(&self) -> u64 {
        self.rows_sent
    }

    pub fn writer(&self) -> &RowWriter {
        &self.writer
    }

    /// Sends every row of `rows`, stopping early once a failure is known.
    pub fn execute<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = InputRow>,
    {
        self.try_execute(rows.into_iter().map(Ok))
    }

    /// Like [`execute`](Self::execute) for sources whose reads can fail. A
    /// failed read aborts the task.
    #[instrument(skip_all, fields(rows_sent = self.rows_sent))]
    pub fn try_execute<I>(&mut self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<InputRow>>,
    {
        if matches!(self.state, TaskState::Closed | TaskState::Aborted) {
            self.writer.check_for_errors()?;
            return Err(WriteError::TaskClosed.into());
        }

        let result = self.send_rows(rows.into_iter());
        match &result {
            Ok(()) => self.state = TaskState::Sent,
            Err(e) => {
                warn!(error = %e, rows_sent = self.rows_sent, "Write task aborted");
                self.state = TaskState::Aborted;
            }
        }
        result
    }

    fn send_rows<I>(&mut self, mut rows: I) -> Result<()>
    where
        I: Iterator<Item = Result<InputRow>>,
    {
        let producer = match &self.producer {
            Some(producer) => Arc::clone(producer),
            None => {
                let producer = self.pool.get_or_create(&self.producer_config)?;
                self.producer = Some(Arc::clone(&producer));
                debug!("Acquired producer handle");
                producer
            }
        };

        self.state = TaskState::Sending;
        // Checked before each pull; rows already sent are not recalled.
        while !self.writer.has_failed() {
            let Some(row) = rows.next() else {
                break;
            };
            let row = row?;

            if let Err(e) = self.writer.send_row(&row, producer.as_ref()) {
                self.writer.record_failure(e.clone());
                return Err(e.into());
            }
            self.rows_sent += 1;
        }

        self.writer.check_for_errors()?;
        Ok(())
    }

    /// Flushes the producer handle and reports the first failure of the
    /// task, if any. Safe to call more than once; only the first call
    /// flushes.
    ///
    /// Failures reading the row source are returned by `execute` only and
    /// are not repeated here, so `Ok` does not mean every row was written.
    #[instrument(skip_all, fields(rows_sent = self.rows_sent))]
    pub fn close(&mut self) -> Result<()> {
        let earlier = self.writer.check_for_errors();

        let result = match self.producer.take() {
            Some(producer) => {
                debug!("Flushing producer");
                if let Err(e) = producer.flush() {
                    self.writer.record_failure(e);
                }
                drop(producer);
                earlier.and_then(|()| self.writer.check_for_errors())
            }
            None => earlier,
        };

        match &result {
            Ok(()) => {
                if self.state != TaskState::Aborted {
                    self.state = TaskState::Closed;
                }
                info!(
                    rows_sent = self.rows_sent,
                    acknowledged = self.writer.acknowledged(),
                    "Write task closed"
                );
            }
            Err(e) => {
                self.state = TaskState::Aborted;
                warn!(
                    error = %e,
                    rows_sent = self.rows_sent,
                    acknowledged = self.writer.acknowledged(),
                    failed = self.writer.failed(),
                    "Write task closed with failure"
                );
            }
        }
        result.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::test_utils::{DeliveryMode, RecordingProducer, StaticPool};
    use crate::schema::{DataType, Field, Value};
    use crate::Error;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("topic", DataType::String),
            Field::new("value", DataType::String),
        ])
    }

    fn row(topic: Option<&str>, value: &str) -> InputRow {
        InputRow::new(vec![topic.into(), Value::string(value)])
    }

    fn task_with(producer: RecordingProducer) -> (WriteTask, Arc<RecordingProducer>, Arc<StaticPool>) {
        let producer = Arc::new(producer);
        let pool = Arc::new(StaticPool::new(Arc::clone(&producer)));
        let task = WriteTask::new(
            Arc::clone(&pool) as Arc<dyn ProducerPool>,
            ProducerConfig::new(),
            &schema(),
            None,
        )
        .unwrap();
        (task, producer, pool)
    }

    #[test]
    fn test_lifecycle_states() {
        let (mut task, producer, pool) = task_with(RecordingProducer::new(DeliveryMode::OnFlush));
        assert_eq!(task.state(), TaskState::Idle);

        task.execute(vec![row(Some("t"), "a"), row(Some("t"), "b")]).unwrap();
        assert_eq!(task.state(), TaskState::Sent);
        assert_eq!(task.rows_sent(), 2);
        assert_eq!(task.writer().acknowledged(), 0);

        task.close().unwrap();
        assert_eq!(task.state(), TaskState::Closed);
        assert_eq!(task.writer().acknowledged(), 2);
        assert_eq!(producer.flushes(), 1);
        assert_eq!(pool.requests(), 1);
    }

    #[test]
    fn test_handle_is_reused_across_executes() {
        let (mut task, producer, pool) = task_with(RecordingProducer::new(DeliveryMode::Immediate));

        task.execute(vec![row(Some("t"), "a")]).unwrap();
        task.execute(vec![row(Some("t"), "b")]).unwrap();
        task.close().unwrap();

        assert_eq!(pool.requests(), 1);
        assert_eq!(producer.records().len(), 2);
    }

    #[test]
    fn test_schema_errors_fail_construction() {
        let pool = Arc::new(StaticPool::new(Arc::new(RecordingProducer::new(
            DeliveryMode::Immediate,
        ))));
        let schema = Schema::new(vec![Field::new("topic", DataType::String)]);

        let result = WriteTask::new(
            Arc::clone(&pool) as Arc<dyn ProducerPool>,
            ProducerConfig::new(),
            &schema,
            None,
        );
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(pool.requests(), 0);
    }

    #[test]
    fn test_loop_stops_once_failure_is_captured() {
        let producer =
            RecordingProducer::new(DeliveryMode::Immediate).failing_when(|r| &r.value[..] == b"bad");
        let (mut task, producer, _pool) = task_with(producer);

        let rows = vec![
            row(Some("t"), "ok"),
            row(Some("t"), "bad"),
            row(Some("t"), "never-sent"),
        ];
        let result = task.execute(rows);

        assert!(matches!(result, Err(Error::Write(WriteError::Delivery(_)))));
        assert_eq!(task.state(), TaskState::Aborted);
        assert_eq!(producer.send_calls(), 2);
        assert_eq!(task.rows_sent(), 2);
    }

    #[test]
    fn test_rows_are_pulled_lazily() {
        let producer =
            RecordingProducer::new(DeliveryMode::Immediate).failing_when(|_| true);
        let (mut task, _producer, _pool) = task_with(producer);

        let mut pulled = 0;
        let rows = std::iter::from_fn(|| {
            pulled += 1;
            Some(row(Some("t"), "v"))
        });
        assert!(task.execute(rows).is_err());
        assert_eq!(pulled, 1);
    }

    #[test]
    fn test_read_failure_aborts_task() {
        let (mut task, producer, _pool) = task_with(RecordingProducer::new(DeliveryMode::Immediate));

        let rows = vec![
            Ok(row(Some("t"), "a")),
            Err(Error::RowDecode {
                line: 2,
                message: "bad".to_string(),
            }),
            Ok(row(Some("t"), "c")),
        ];
        let result = task.try_execute(rows);

        assert!(matches!(result, Err(Error::RowDecode { line: 2, .. })));
        assert_eq!(producer.records().len(), 1);
        assert_eq!(task.state(), TaskState::Aborted);

        task.close().unwrap();
        assert_eq!(producer.flushes(), 1);
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[test]
    fn test_close_reports_failure_seen_during_flush() {
        let producer =
            RecordingProducer::new(DeliveryMode::OnFlush).failing_when(|r| &r.value[..] == b"b");
        let (mut task, _producer, _pool) = task_with(producer);

        task.execute(vec![row(Some("t"), "a"), row(Some("t"), "b")]).unwrap();
        assert_eq!(task.state(), TaskState::Sent);

        let result = task.close();
        assert!(matches!(result, Err(Error::Write(WriteError::Delivery(_)))));
        assert_eq!(task.state(), TaskState::Aborted);
    }

    #[test]
    fn test_close_flushes_even_after_failure() {
        let producer = RecordingProducer::new(DeliveryMode::OnFlush);
        let (mut task, producer, _pool) = task_with(producer);

        let result = task.execute(vec![row(Some("t"), "a"), row(None, "b")]);
        assert!(matches!(result, Err(Error::Write(WriteError::NullTopic))));
        assert_eq!(task.writer().acknowledged(), 0);

        let closed = task.close();
        assert!(matches!(closed, Err(Error::Write(WriteError::NullTopic))));
        assert_eq!(producer.flushes(), 1);
        assert_eq!(task.writer().acknowledged(), 1);
    }

    #[test]
    fn test_close_surfaces_flush_failure() {
        let producer = RecordingProducer::new(DeliveryMode::OnFlush).failing_flush();
        let (mut task, producer, _pool) = task_with(producer);

        task.execute(vec![row(Some("t"), "a")]).unwrap();

        let closed = task.close();
        assert!(matches!(closed, Err(Error::Write(WriteError::Flush(_)))));
        assert_eq!(task.state(), TaskState::Aborted);
        assert_eq!(producer.flushes(), 1);
        assert_eq!(task.writer().acknowledged(), 1);
    }

    #[test]
    fn test_flush_failure_does_not_mask_earlier_null_topic() {
        let producer = RecordingProducer::new(DeliveryMode::OnFlush).failing_flush();
        let (mut task, producer, _pool) = task_with(producer);

        let result = task.execute(vec![row(Some("t"), "a"), row(None, "b")]);
        assert!(matches!(result, Err(Error::Write(WriteError::NullTopic))));

        let closed = task.close();
        assert!(matches!(closed, Err(Error::Write(WriteError::NullTopic))));
        assert_eq!(producer.flushes(), 1);
    }

    #[test]
    fn test_flush_failure_does_not_mask_delivery_failure() {
        let producer = RecordingProducer::new(DeliveryMode::OnFlush)
            .failing_when(|r| &r.value[..] == b"b")
            .failing_flush();
        let (mut task, _producer, _pool) = task_with(producer);

        task.execute(vec![row(Some("t"), "a"), row(Some("t"), "b")]).unwrap();

        let closed = task.close();
        assert!(matches!(closed, Err(Error::Write(WriteError::Delivery(_)))));
        assert_eq!(task.writer().discarded_failures(), 1);
    }

    #[test]
    fn test_execute_after_close_is_rejected() {
        let (mut task, producer, _pool) = task_with(RecordingProducer::new(DeliveryMode::Immediate));
        task.close().unwrap();
        assert_eq!(producer.flushes(), 0);

        let result = task.execute(vec![row(Some("t"), "a")]);
        assert!(matches!(result, Err(Error::Write(WriteError::TaskClosed))));
        assert_eq!(producer.send_calls(), 0);
    }

    #[test]
    fn test_close_twice_does_not_flush_again() {
        let (mut task, producer, _pool) = task_with(RecordingProducer::new(DeliveryMode::Immediate));
        task.execute(vec![row(Some("t"), "a")]).unwrap();

        task.close().unwrap();
        task.close().unwrap();
        assert_eq!(producer.flushes(), 1);
        assert_eq!(task.state(), TaskState::Closed);
    }
}
