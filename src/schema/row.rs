use bytes::Bytes;

/// A single typed cell of an input row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Binary(Bytes),
    Int32(i32),
    Int64(i64),
    Boolean(bool),
    Float64(f64),
    Array(Vec<Value>),
    Struct(Vec<Value>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn binary(b: impl Into<Bytes>) -> Self {
        Value::Binary(b.into())
    }

    /// Builds a headers cell: a list of `(key, value)` structs.
    pub fn headers<K, V>(pairs: impl IntoIterator<Item = (K, Option<V>)>) -> Self
    where
        K: Into<String>,
        V: Into<Bytes>,
    {
        Value::Array(
            pairs
                .into_iter()
                .map(|(key, value)| {
                    Value::Struct(vec![
                        Value::String(key.into()),
                        value.map_or(Value::Null, |v| Value::Binary(v.into())),
                    ])
                })
                .collect(),
        )
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(b))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One fixed-schema input record. Values are positional and line up with
/// the fields of the schema the row was produced under.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InputRow {
    values: Vec<Value>,
}

impl InputRow {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl From<Vec<Value>> for InputRow {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
