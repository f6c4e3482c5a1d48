use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

use super::pool::{ProducerConfig, ProducerPool};
use super::producer::{DeliveryCallback, RecordProducer};
use super::record::BrokerRecord;
use crate::error::WriteError;

pub fn timed_out() -> KafkaError {
    KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut)
}

/// When the recording producer reports deliveries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Inside `send`, before it returns.
    Immediate,
    /// During `flush`.
    OnFlush,
    /// From a spawned thread per record; `flush` joins them.
    Threaded,
}

type Outcome = Box<dyn Fn(&BrokerRecord) -> Result<(), KafkaError> + Send + Sync>;

/// In-memory producer that records what it was sent.
pub struct RecordingProducer {
    mode: DeliveryMode,
    outcome: Outcome,
    reject: bool,
    fail_flush: bool,
    records: Mutex<Vec<BrokerRecord>>,
    pending: Mutex<Vec<(DeliveryCallback, Result<(), KafkaError>)>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    send_calls: AtomicUsize,
    flushes: AtomicUsize,
}

impl RecordingProducer {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            outcome: Box::new(|_| Ok(())),
            reject: false,
            fail_flush: false,
            records: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Deliveries of records matching `predicate` fail with a timeout.
    pub fn failing_when(
        mut self,
        predicate: impl Fn(&BrokerRecord) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.outcome = Box::new(move |record| {
            if predicate(record) {
                Err(timed_out())
            } else {
                Ok(())
            }
        });
        self
    }

    pub fn rejecting_sends(mut self) -> Self {
        self.reject = true;
        self
    }

    /// `flush` still completes pending deliveries, then fails with a timeout.
    pub fn failing_flush(mut self) -> Self {
        self.fail_flush = true;
        self
    }

    pub fn records(&self) -> Vec<BrokerRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl RecordProducer for RecordingProducer {
    fn send(&self, record: BrokerRecord, on_complete: DeliveryCallback) -> Result<(), WriteError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject {
            return Err(WriteError::Enqueue(KafkaError::MessageProduction(
                RDKafkaErrorCode::MessageSizeTooLarge,
            )));
        }

        let outcome = (self.outcome)(&record);
        self.records.lock().unwrap().push(record);

        match self.mode {
            DeliveryMode::Immediate => on_complete(outcome),
            DeliveryMode::OnFlush => self.pending.lock().unwrap().push((on_complete, outcome)),
            DeliveryMode::Threaded => {
                let handle = thread::spawn(move || on_complete(outcome));
                self.threads.lock().unwrap().push(handle);
            }
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), WriteError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (on_complete, outcome) in pending {
            on_complete(outcome);
        }
        let threads = std::mem::take(&mut *self.threads.lock().unwrap());
        for handle in threads {
            handle.join().unwrap();
        }
        if self.fail_flush {
            return Err(WriteError::Flush(KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut)));
        }
        Ok(())
    }
}

/// Pool that always hands out the same producer.
pub struct StaticPool {
    producer: Arc<RecordingProducer>,
    requests: AtomicUsize,
}

impl StaticPool {
    pub fn new(producer: Arc<RecordingProducer>) -> Self {
        Self {
            producer,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ProducerPool for StaticPool {
    fn get_or_create(&self, _config: &ProducerConfig) -> crate::Result<Arc<dyn RecordProducer>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.producer) as Arc<dyn RecordProducer>)
    }
}
