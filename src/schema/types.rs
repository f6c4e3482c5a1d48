use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Column types understood by the sink.
///
/// Parsed from and rendered as a compact type string such as
/// `array<struct<key:string,value:binary>>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    String,
    Binary,
    Int32,
    Int64,
    Boolean,
    Float64,
    Array(Box<DataType>),
    Struct(Vec<Field>),
}

impl DataType {
    /// The type a `headers` attribute must have: a sequence of
    /// (string, binary) pairs.
    pub fn headers() -> Self {
        DataType::Array(Box::new(DataType::Struct(vec![
            Field::new("key", DataType::String),
            Field::new("value", DataType::Binary),
        ])))
    }

    /// Members are matched by position, names are not significant.
    pub fn is_headers(&self) -> bool {
        match self {
            DataType::Array(element) => match element.as_ref() {
                DataType::Struct(members) => {
                    members.len() == 2
                        && members[0].data_type == DataType::String
                        && members[1].data_type == DataType::Binary
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::String => f.write_str("string"),
            DataType::Binary => f.write_str("binary"),
            DataType::Int32 => f.write_str("int"),
            DataType::Int64 => f.write_str("bigint"),
            DataType::Boolean => f.write_str("boolean"),
            DataType::Float64 => f.write_str("double"),
            DataType::Array(element) => write!(f, "array<{}>", element),
            DataType::Struct(members) => {
                f.write_str("struct<")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", member.name, member.data_type)?;
                }
                f.write_str(">")
            }
        }
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = TypeParser { input: s, pos: 0 };
        let data_type = parser.parse_type()?;
        parser.skip_whitespace();
        if parser.pos != s.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(data_type)
    }
}

struct TypeParser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> TypeParser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Config(format!(
            "invalid data type '{}': {} at offset {}",
            self.input, message, self.pos
        ))
    }

    fn identifier(&mut self) -> Result<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(&self.input[start..self.pos])
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_type(&mut self) -> Result<DataType> {
        let name = self.identifier()?.to_ascii_lowercase();
        match name.as_str() {
            "string" => Ok(DataType::String),
            "binary" => Ok(DataType::Binary),
            "int" | "integer" => Ok(DataType::Int32),
            "bigint" | "long" => Ok(DataType::Int64),
            "boolean" => Ok(DataType::Boolean),
            "double" => Ok(DataType::Float64),
            "array" => {
                self.expect('<')?;
                let element = self.parse_type()?;
                self.expect('>')?;
                Ok(DataType::Array(Box::new(element)))
            }
            "struct" => {
                self.expect('<')?;
                let mut members = Vec::new();
                loop {
                    let member = self.identifier()?.to_string();
                    self.expect(':')?;
                    let data_type = self.parse_type()?;
                    members.push(Field::new(member, data_type));

                    self.skip_whitespace();
                    match self.peek() {
                        Some(',') => self.pos += 1,
                        Some('>') => {
                            self.pos += 1;
                            break;
                        }
                        _ => return Err(self.error("expected ',' or '>'")),
                    }
                }
                Ok(DataType::Struct(members))
            }
            other => Err(Error::Config(format!("unknown data type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    /// Creates a nullable field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of fields describing every row of a write task.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of the first field whose name matches, ignoring ASCII case.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.name.eq_ignore_ascii_case(name))
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }
}

impl FromIterator<Field> for Schema {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
