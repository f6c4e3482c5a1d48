#![allow(dead_code)]

use kafka_row_sink::kafka::{
    BrokerRecord, DeliveryCallback, ProducerConfig, ProducerPool, RecordProducer,
};
use kafka_row_sink::WriteError;
use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

type Predicate = Box<dyn Fn(&BrokerRecord) -> bool + Send + Sync>;

/// Holds every delivery until `flush`, then completes them all at once from
/// separate threads so that failing callbacks race each other.
pub struct MockProducer {
    fail_when: Predicate,
    records: Mutex<Vec<BrokerRecord>>,
    pending: Mutex<Vec<(DeliveryCallback, bool)>>,
    flushes: AtomicUsize,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::failing_when(|_| false)
    }

    pub fn failing_when(predicate: impl Fn(&BrokerRecord) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail_when: Box::new(predicate),
            records: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
            flushes: AtomicUsize::new(0),
        }
    }

    pub fn records(&self) -> Vec<BrokerRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

impl RecordProducer for MockProducer {
    fn send(&self, record: BrokerRecord, on_complete: DeliveryCallback) -> Result<(), WriteError> {
        let fails = (self.fail_when)(&record);
        self.records.lock().unwrap().push(record);
        self.pending.lock().unwrap().push((on_complete, fails));
        Ok(())
    }

    fn flush(&self) -> Result<(), WriteError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        let workers: Vec<_> = pending
            .into_iter()
            .map(|(on_complete, fails)| {
                thread::spawn(move || {
                    let outcome = if fails {
                        Err(KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut))
                    } else {
                        Ok(())
                    };
                    on_complete(outcome)
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        Ok(())
    }
}

pub struct MockPool {
    pub producer: Arc<MockProducer>,
    requests: AtomicUsize,
}

impl MockPool {
    pub fn new(producer: MockProducer) -> Arc<Self> {
        Arc::new(Self {
            producer: Arc::new(producer),
            requests: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl ProducerPool for MockPool {
    fn get_or_create(
        &self,
        _config: &ProducerConfig,
    ) -> kafka_row_sink::Result<Arc<dyn RecordProducer>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.producer) as Arc<dyn RecordProducer>)
    }
}
