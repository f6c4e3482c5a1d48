use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::kafka::ProducerConfig;
use crate::schema::{DataType, Field, Schema};
use crate::Result;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    pub schema: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    /// Upper bound on a task's final flush. Unset waits for every delivery.
    #[serde(default)]
    pub flush_timeout_secs: Option<u64>,
    /// Raw librdkafka properties, applied after the settings above.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SinkConfig {
    /// Topic for every row, taking precedence over a `topic` column.
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("ROW_SINK")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.brokers")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// The row schema. Fails on unknown type names.
    pub fn schema(&self) -> Result<Schema> {
        self.schema
            .iter()
            .map(|field| {
                let data_type: DataType = field.data_type.parse()?;
                let mut parsed = Field::new(field.name.clone(), data_type);
                parsed.nullable = field.nullable;
                Ok(parsed)
            })
            .collect::<Result<Vec<_>>>()
            .map(Schema::new)
    }

    pub fn producer_config(&self) -> ProducerConfig {
        let kafka = &self.kafka;
        let mut producer = ProducerConfig::new()
            .set("bootstrap.servers", kafka.brokers.join(","))
            .set("compression.type", kafka.compression.as_str())
            .set("acks", kafka.acks.as_str())
            .set("linger.ms", kafka.linger_ms.to_string())
            .set("batch.size", kafka.batch_size.to_string())
            .set("message.timeout.ms", kafka.message_timeout_ms.to_string())
            .with_flush_timeout(kafka.flush_timeout_secs.map(Duration::from_secs));

        for (key, value) in &kafka.properties {
            producer = producer.set(key.as_str(), value.as_str());
        }
        producer
    }
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    100
}

fn default_batch_size() -> usize {
    16384
}

fn default_message_timeout_ms() -> u64 {
    300_000
}

fn default_nullable() -> bool {
    true
}
