//! One-time schema validation into a fixed field-extraction plan.
//!
//! [`ProjectionBuilder`] resolves the five sink attributes (`topic`, `key`,
//! `value`, `headers`, `partition`) against a [`Schema`] exactly once. The
//! resulting [`Projection`] only holds column positions and the cast chosen
//! for each of them, so applying it to a row never looks at the schema again.
//!
//! # Example
//!
//! ```rust
//! use kafka_row_sink::kafka::Projection;
//! use kafka_row_sink::schema::{DataType, Field, InputRow, Schema, Value};
//!
//! let schema = Schema::new(vec![
//!     Field::new("key", DataType::String),
//!     Field::new("value", DataType::Binary),
//! ]);
//! let projection = Projection::build(&schema, Some("events".to_string())).unwrap();
//!
//! let row = InputRow::new(vec![Value::string("k1"), Value::binary(vec![1u8, 2])]);
//! let projected = projection.project(&row).unwrap();
//! assert_eq!(projected.topic.as_deref(), Some("events"));
//! assert_eq!(projected.key.as_deref(), Some(&b"k1"[..]));
//! ```

use std::fmt;

use bytes::Bytes;
use tracing::debug;

use super::record::{ProjectedRow, RecordHeader};
use crate::error::WriteError;
use crate::schema::{DataType, InputRow, Schema, Value};
use crate::{Error, Result};

/// The attributes a sink row is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAttribute {
    Topic,
    Key,
    Value,
    Headers,
    Partition,
}

impl SinkAttribute {
    pub const ALL: [SinkAttribute; 5] = [
        SinkAttribute::Topic,
        SinkAttribute::Key,
        SinkAttribute::Value,
        SinkAttribute::Headers,
        SinkAttribute::Partition,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SinkAttribute::Topic => "topic",
            SinkAttribute::Key => "key",
            SinkAttribute::Value => "value",
            SinkAttribute::Headers => "headers",
            SinkAttribute::Partition => "partition",
        }
    }
}

impl fmt::Display for SinkAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where an attribute's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Read from the schema column at `index`.
    Column { index: usize, data_type: DataType },
    /// A literal supplied outside the schema (the topic override).
    Override(String),
    /// Not present; the attribute's default applies.
    Default,
}

/// One entry of the resolution table built during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldResolution {
    pub attribute: SinkAttribute,
    pub source: Source,
}

#[derive(Debug, Clone)]
struct Column {
    index: usize,
    name: String,
    data_type: DataType,
}

impl Column {
    fn get<'r>(&self, row: &'r InputRow) -> std::result::Result<&'r Value, WriteError> {
        row.get(self.index).ok_or_else(|| self.mismatch())
    }

    fn mismatch(&self) -> WriteError {
        WriteError::RowMismatch {
            field: self.name.clone(),
            expected: self.data_type.clone(),
        }
    }
}

#[derive(Debug, Clone)]
enum TopicSource {
    Override(String),
    Column(Column),
}

/// A string or binary column, with the cast to bytes decided at build time.
#[derive(Debug, Clone)]
enum BytesColumn {
    Utf8(Column),
    Raw(Column),
}

impl BytesColumn {
    fn resolve(column: Column) -> Option<Self> {
        match column.data_type {
            DataType::String => Some(BytesColumn::Utf8(column)),
            DataType::Binary => Some(BytesColumn::Raw(column)),
            _ => None,
        }
    }

    fn extract(&self, row: &InputRow) -> std::result::Result<Option<Bytes>, WriteError> {
        match self {
            BytesColumn::Utf8(column) => match column.get(row)? {
                Value::Null => Ok(None),
                Value::String(s) => Ok(Some(Bytes::copy_from_slice(s.as_bytes()))),
                _ => Err(column.mismatch()),
            },
            BytesColumn::Raw(column) => match column.get(row)? {
                Value::Null => Ok(None),
                Value::Binary(b) => Ok(Some(b.clone())),
                _ => Err(column.mismatch()),
            },
        }
    }
}

/// Validates a schema and compiles it into a [`Projection`].
#[derive(Debug, Clone)]
pub struct ProjectionBuilder<'a> {
    schema: &'a Schema,
    topic_override: Option<String>,
}

impl<'a> ProjectionBuilder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            topic_override: None,
        }
    }

    /// A topic that takes precedence over any `topic` column.
    pub fn topic_override(mut self, topic: Option<String>) -> Self {
        self.topic_override = topic;
        self
    }

    fn column(&self, attribute: SinkAttribute) -> Option<Column> {
        let index = self.schema.index_of(attribute.name())?;
        let field = self.schema.field(index)?;
        Some(Column {
            index,
            name: field.name.clone(),
            data_type: field.data_type.clone(),
        })
    }

    pub fn build(self) -> Result<Projection> {
        let topic = match (&self.topic_override, self.column(SinkAttribute::Topic)) {
            (Some(topic), _) => TopicSource::Override(topic.clone()),
            (None, Some(column)) if column.data_type == DataType::String => {
                TopicSource::Column(column)
            }
            (None, Some(column)) => {
                return Err(Error::Config(format!(
                    "topic attribute unsupported type {}; topic must be a string",
                    column.data_type
                )))
            }
            (None, None) => {
                return Err(Error::Config(
                    "topic option required when no 'topic' attribute is present; use the topic option for setting a topic".to_string(),
                ))
            }
        };

        let key = match self.column(SinkAttribute::Key) {
            Some(column) => {
                let data_type = column.data_type.clone();
                Some(BytesColumn::resolve(column).ok_or_else(|| {
                    Error::Config(format!(
                        "key attribute type must be a string or binary, found {}",
                        data_type
                    ))
                })?)
            }
            None => None,
        };

        let value = match self.column(SinkAttribute::Value) {
            Some(column) => {
                let data_type = column.data_type.clone();
                BytesColumn::resolve(column).ok_or_else(|| {
                    Error::Config(format!(
                        "value attribute type must be a string or binary, found {}",
                        data_type
                    ))
                })?
            }
            None => {
                return Err(Error::Config(
                    "required attribute 'value' not found".to_string(),
                ))
            }
        };

        let headers = match self.column(SinkAttribute::Headers) {
            Some(column) if column.data_type.is_headers() => Some(column),
            Some(column) => {
                return Err(Error::Config(format!(
                    "headers attribute type must be {}, found {}",
                    DataType::headers(),
                    column.data_type
                )))
            }
            None => None,
        };

        let partition = match self.column(SinkAttribute::Partition) {
            Some(column) if column.data_type == DataType::Int32 => Some(column),
            Some(column) => {
                return Err(Error::Config(format!(
                    "partition attribute type must be an int, found {}",
                    column.data_type
                )))
            }
            None => None,
        };

        let projection = Projection {
            topic,
            key,
            value,
            headers,
            partition,
        };
        debug!(resolution = ?projection.resolution(), "Projection built");
        Ok(projection)
    }
}

/// Precompiled mapping from an [`InputRow`] to its sink attributes.
#[derive(Debug, Clone)]
pub struct Projection {
    topic: TopicSource,
    key: Option<BytesColumn>,
    value: BytesColumn,
    headers: Option<Column>,
    partition: Option<Column>,
}

impl Projection {
    /// Validates `schema` and compiles it; fails with [`Error::Config`]
    /// before any row is seen.
    pub fn build(schema: &Schema, topic_override: Option<String>) -> Result<Self> {
        ProjectionBuilder::new(schema)
            .topic_override(topic_override)
            .build()
    }

    /// The resolution table, one entry per sink attribute.
    pub fn resolution(&self) -> Vec<FieldResolution> {
        fn from_column(column: Option<&Column>) -> Source {
            column.map_or(Source::Default, |c| Source::Column {
                index: c.index,
                data_type: c.data_type.clone(),
            })
        }
        fn bytes_column(column: &BytesColumn) -> &Column {
            match column {
                BytesColumn::Utf8(c) | BytesColumn::Raw(c) => c,
            }
        }

        SinkAttribute::ALL
            .iter()
            .map(|&attribute| {
                let source = match attribute {
                    SinkAttribute::Topic => match &self.topic {
                        TopicSource::Override(topic) => Source::Override(topic.clone()),
                        TopicSource::Column(c) => from_column(Some(c)),
                    },
                    SinkAttribute::Key => from_column(self.key.as_ref().map(bytes_column)),
                    SinkAttribute::Value => from_column(Some(bytes_column(&self.value))),
                    SinkAttribute::Headers => from_column(self.headers.as_ref()),
                    SinkAttribute::Partition => from_column(self.partition.as_ref()),
                };
                FieldResolution { attribute, source }
            })
            .collect()
    }

    /// Applies the plan to one row.
    ///
    /// The topic is resolved first, so a row with a null topic fails with
    /// [`WriteError::NullTopic`] whatever else is wrong with it. A null value
    /// is rejected with [`WriteError::NullValue`].
    pub fn project(&self, row: &InputRow) -> std::result::Result<ProjectedRow, WriteError> {
        let topic = match &self.topic {
            TopicSource::Override(topic) => topic.clone(),
            TopicSource::Column(column) => match column.get(row)? {
                Value::Null => return Err(WriteError::NullTopic),
                Value::String(topic) => topic.clone(),
                _ => return Err(column.mismatch()),
            },
        };

        let key = match &self.key {
            Some(column) => column.extract(row)?,
            None => None,
        };

        let value = self.value.extract(row)?.ok_or(WriteError::NullValue)?;

        let headers = match &self.headers {
            Some(column) => extract_headers(column, row)?,
            None => Vec::new(),
        };

        let partition = match &self.partition {
            Some(column) => match column.get(row)? {
                Value::Null => None,
                Value::Int32(partition) => Some(*partition),
                _ => return Err(column.mismatch()),
            },
            None => None,
        };

        Ok(ProjectedRow {
            topic: Some(topic),
            key,
            value,
            headers,
            partition,
        })
    }
}

fn extract_headers(
    column: &Column,
    row: &InputRow,
) -> std::result::Result<Vec<RecordHeader>, WriteError> {
    let items = match column.get(row)? {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        _ => return Err(column.mismatch()),
    };

    items
        .iter()
        .map(|item| match item {
            Value::Struct(members) => match members.as_slice() {
                [Value::String(key), Value::Binary(value)] => {
                    Ok(RecordHeader::new(key.clone(), Some(value.clone())))
                }
                [Value::String(key), Value::Null] => Ok(RecordHeader::new(key.clone(), None)),
                _ => Err(column.mismatch()),
            },
            _ => Err(column.mismatch()),
        })
        .collect()
}
