//! Newline-delimited JSON row source.
//!
//! Each non-blank line holds one JSON object whose members are matched to
//! schema fields by name. Binary cells are written either as standard
//! base64 strings or as arrays of byte values.

use std::io::{BufRead, Lines};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde_json::Value as Json;

use super::row::{InputRow, Value};
use super::types::{DataType, Field, Schema};
use crate::{Error, Result};

static NULL: Json = Json::Null;

/// Lazily decodes rows from a reader, one line at a time.
pub struct JsonRowReader<R> {
    lines: Lines<R>,
    schema: Schema,
    line: usize,
}

impl<R: BufRead> JsonRowReader<R> {
    pub fn new(reader: R, schema: Schema) -> Self {
        Self {
            lines: reader.lines(),
            schema,
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for JsonRowReader<R> {
    type Item = Result<InputRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(Error::Io(e))),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }

            let line = self.line;
            let decoded = serde_json::from_str::<Json>(&text)
                .map_err(|e| e.to_string())
                .and_then(|json| decode_row(&self.schema, &json))
                .map_err(|message| Error::RowDecode { line, message });
            return Some(decoded);
        }
    }
}

/// Decodes a single JSON object into a row laid out like `schema`.
pub fn decode_row(schema: &Schema, json: &Json) -> std::result::Result<InputRow, String> {
    let object = json
        .as_object()
        .ok_or_else(|| "expected a JSON object".to_string())?;

    let values = schema
        .fields()
        .iter()
        .map(|field| decode_field(field, object.get(&field.name).unwrap_or(&NULL)))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(InputRow::new(values))
}

fn decode_field(field: &Field, json: &Json) -> std::result::Result<Value, String> {
    if json.is_null() {
        if field.nullable {
            return Ok(Value::Null);
        }
        return Err(format!("attribute '{}' is not nullable", field.name));
    }
    decode_value(&field.data_type, json).map_err(|e| format!("attribute '{}': {}", field.name, e))
}

fn decode_value(data_type: &DataType, json: &Json) -> std::result::Result<Value, String> {
    let mismatch = || format!("expected {}, found {}", data_type, json);

    match data_type {
        DataType::String => json
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(mismatch),
        DataType::Binary => match json {
            Json::String(encoded) => STANDARD
                .decode(encoded)
                .map(|b| Value::Binary(Bytes::from(b)))
                .map_err(|e| format!("invalid base64: {}", e)),
            Json::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(mismatch)
                })
                .collect::<std::result::Result<Vec<u8>, _>>()
                .map(|b| Value::Binary(Bytes::from(b))),
            _ => Err(mismatch()),
        },
        DataType::Int32 => json
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int32)
            .ok_or_else(mismatch),
        DataType::Int64 => json.as_i64().map(Value::Int64).ok_or_else(mismatch),
        DataType::Boolean => json.as_bool().map(Value::Boolean).ok_or_else(mismatch),
        DataType::Float64 => json.as_f64().map(Value::Float64).ok_or_else(mismatch),
        DataType::Array(element) => json
            .as_array()
            .ok_or_else(mismatch)?
            .iter()
            .map(|item| {
                if item.is_null() {
                    Ok(Value::Null)
                } else {
                    decode_value(element, item)
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Value::Array),
        DataType::Struct(members) => {
            let cells: Vec<&Json> = match json {
                Json::Object(object) => members
                    .iter()
                    .map(|m| object.get(&m.name).unwrap_or(&NULL))
                    .collect(),
                Json::Array(items) if items.len() == members.len() => items.iter().collect(),
                _ => return Err(mismatch()),
            };
            members
                .iter()
                .zip(cells)
                .map(|(member, cell)| decode_field(member, cell))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Struct)
        }
    }
}
