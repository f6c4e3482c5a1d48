pub mod json;
pub mod row;
pub mod types;

pub use json::JsonRowReader;
pub use row::{InputRow, Value};
pub use types::{DataType, Field, Schema};
