//! Writes several row sources to Kafka, one write task per source.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, instrument};

use crate::kafka::{KafkaProducerCache, ProducerConfig, ProducerPool, Projection, WriteTask};
use crate::schema::{InputRow, JsonRowReader, Schema};
use crate::{Config, Error, Result};

/// Where a partition's rows are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

impl From<PathBuf> for Input {
    fn from(path: PathBuf) -> Self {
        if path.as_os_str() == "-" {
            Input::Stdin
        } else {
            Input::File(path)
        }
    }
}

impl Input {
    fn open(&self) -> Result<Box<dyn BufRead + Send>> {
        match self {
            Input::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            Input::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }
}

pub struct Pipeline {
    pool: Arc<dyn ProducerPool>,
    producer_config: ProducerConfig,
    schema: Schema,
    projection: Projection,
}

impl Pipeline {
    /// Checks the schema up front so that a bad configuration is reported
    /// before any input is opened.
    pub fn new(config: &Config, pool: Arc<dyn ProducerPool>) -> Result<Self> {
        let schema = config.schema()?;
        let projection = Projection::build(&schema, config.sink.topic.clone())?;
        Ok(Self {
            pool,
            producer_config: config.producer_config(),
            schema,
            projection,
        })
    }

    pub fn with_kafka(config: &Config) -> Result<Self> {
        Self::new(config, Arc::new(KafkaProducerCache::new()))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Writes one partition and closes its task whatever happened. Returns
    /// the number of rows sent.
    #[instrument(skip(self, rows))]
    pub fn write_partition<I>(&self, partition: usize, rows: I) -> Result<u64>
    where
        I: IntoIterator<Item = Result<InputRow>>,
    {
        let mut task = WriteTask::with_projection(
            Arc::clone(&self.pool),
            self.producer_config.clone(),
            self.projection.clone(),
        );

        let executed = task.try_execute(rows);
        let closed = task.close();
        executed?;
        closed?;
        Ok(task.rows_sent())
    }

    /// Writes every input as its own partition on the blocking thread pool.
    /// All partitions run to completion; the first failure is returned.
    pub async fn run(self: Arc<Self>, inputs: Vec<Input>) -> Result<u64> {
        info!(partitions = inputs.len(), "Starting pipeline");

        let handles = inputs.into_iter().enumerate().map(|(partition, input)| {
            let pipeline = Arc::clone(&self);
            tokio::task::spawn_blocking(move || {
                let reader = input.open()?;
                let rows = JsonRowReader::new(reader, pipeline.schema.clone());
                pipeline.write_partition(partition, rows)
            })
        });

        let mut total = 0;
        let mut first_error = None;
        for (partition, joined) in join_all(handles).await.into_iter().enumerate() {
            let outcome = joined
                .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::Other, e)))
                .and_then(|result| result);
            match outcome {
                Ok(rows) => {
                    info!(partition, rows, "Partition written");
                    total += rows;
                }
                Err(e) => {
                    error!(partition, error = %e, "Partition failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(rows = total, "Pipeline finished");
                Ok(total)
            }
        }
    }
}
