use bytes::Bytes;

use crate::error::WriteError;

/// A record header. Header values may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub value: Option<Bytes>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: Option<Bytes>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// The sink attributes of one row, resolved by a [`Projection`](super::Projection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectedRow {
    pub topic: Option<String>,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<RecordHeader>,
    pub partition: Option<i32>,
}

/// The unit handed to a producer. `partition: None` lets the broker client
/// pick the partition; an empty header list sends no headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<RecordHeader>,
}

impl TryFrom<ProjectedRow> for BrokerRecord {
    type Error = WriteError;

    fn try_from(row: ProjectedRow) -> Result<Self, Self::Error> {
        let topic = row.topic.ok_or(WriteError::NullTopic)?;
        Ok(Self {
            topic,
            partition: row.partition,
            key: row.key,
            value: row.value,
            headers: row.headers,
        })
    }
}
