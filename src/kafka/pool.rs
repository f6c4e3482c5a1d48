use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use super::producer::{KafkaProducer, RecordProducer};
use crate::Result;

/// Client properties for a producer, passed through to the broker client
/// untouched. Two equal configurations share a cached producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProducerConfig {
    properties: BTreeMap<String, String>,
    flush_timeout: Option<Duration>,
}

impl ProducerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Bounds how long a flush may block; `None` waits indefinitely.
    pub fn with_flush_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&String, &String)> {
        self.properties.iter()
    }

    pub fn flush_timeout(&self) -> Option<Duration> {
        self.flush_timeout
    }
}

/// Hands out producer handles. Handles are borrowed by write tasks and
/// owned by the pool.
pub trait ProducerPool: Send + Sync {
    fn get_or_create(&self, config: &ProducerConfig) -> Result<Arc<dyn RecordProducer>>;
}

/// Keeps one [`KafkaProducer`] per distinct configuration.
#[derive(Default)]
pub struct KafkaProducerCache {
    producers: Mutex<HashMap<ProducerConfig, Arc<KafkaProducer>>>,
}

impl KafkaProducerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets the producer for `config`. Tasks still holding it keep
    /// using it until they drop their handle.
    pub fn invalidate(&self, config: &ProducerConfig) -> bool {
        let removed = self
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(config)
            .is_some();
        if removed {
            debug!("Invalidated cached producer");
        }
        removed
    }

    pub fn clear(&self) {
        self.producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl ProducerPool for KafkaProducerCache {
    fn get_or_create(&self, config: &ProducerConfig) -> Result<Arc<dyn RecordProducer>> {
        let mut producers = self
            .producers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(producer) = producers.get(config) {
            debug!("Reusing cached producer");
            return Ok(Arc::clone(producer) as Arc<dyn RecordProducer>);
        }

        let producer = Arc::new(KafkaProducer::new(config)?);
        producers.insert(config.clone(), Arc::clone(&producer));
        info!(cached = producers.len(), "Cached new producer");
        Ok(producer)
    }
}
