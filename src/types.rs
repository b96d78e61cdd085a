use std::convert::TryFrom;

use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

use crate::error::GpkgError;

/// Attribute column types a table can be created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    Text,
    /// 16 bit integer.
    Short,
    /// 32 bit integer.
    Long,
    /// 32 bit integer; an alias of `Long` on write.
    Integer,
    Float,
    Double,
    /// ISO 8601 timestamp stored as text.
    Date,
    Blob,
    /// Text of at most 38 characters, e.g. `{xxxxxxxx-xxxx-...}`.
    Guid,
}

impl ColumnType {
    /// Case-insensitive lookup by type name, e.g. `"short"` or `"GUID"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(Self::Boolean),
            "text" | "string" => Some(Self::Text),
            "short" => Some(Self::Short),
            "long" => Some(Self::Long),
            "integer" | "int" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            "date" => Some(Self::Date),
            "blob" => Some(Self::Blob),
            "guid" => Some(Self::Guid),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Owned SQLite value of an attribute column.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Value::Null => ValueRef::Null,
            Value::Integer(v) => ValueRef::Integer(*v),
            Value::Real(v) => ValueRef::Real(*v),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<i16> for Value {
    fn from(value: i16) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<Value> for i64 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Integer(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "integer",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for i32 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let v = i64::try_from(value)?;
        i32::try_from(v).map_err(|_| GpkgError::ValueOutOfRange { target: "i32" })
    }
}

impl TryFrom<Value> for i16 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let v = i64::try_from(value)?;
        i16::try_from(v).map_err(|_| GpkgError::ValueOutOfRange { target: "i16" })
    }
}

impl TryFrom<Value> for f64 {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Real(v) => Ok(v),
            Value::Integer(v) => Ok(v as f64),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "real",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match i64::try_from(value)? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(GpkgError::ValueOutOfRange { target: "bool" }),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "text",
                actual: other.type_name(),
            }),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = GpkgError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(GpkgError::ValueTypeMismatch {
                expected: "blob",
                actual: other.type_name(),
            }),
        }
    }
}

macro_rules! impl_try_from_value_for_option {
    ($($t:ty),*) => {
        $(
            impl TryFrom<Value> for Option<$t> {
                type Error = GpkgError;

                fn try_from(value: Value) -> Result<Self, Self::Error> {
                    match value {
                        Value::Null => Ok(None),
                        other => <$t>::try_from(other).map(Some),
                    }
                }
            }
        )*
    };
}

impl_try_from_value_for_option!(i64, i32, i16, f64, bool, String, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::{ColumnType, Value};
    use crate::error::GpkgError;

    #[test]
    fn conversions() -> crate::Result<()> {
        assert_eq!(i64::try_from(Value::from(7i32))?, 7);
        assert_eq!(f64::try_from(Value::Integer(2))?, 2.0);
        assert!(bool::try_from(Value::from(true))?);
        assert_eq!(String::try_from(Value::from("abc"))?, "abc");
        assert_eq!(Option::<i64>::try_from(Value::Null)?, None);
        assert_eq!(Value::from(None::<String>), Value::Null);
        Ok(())
    }

    #[test]
    fn conversion_errors() {
        assert!(matches!(
            i64::try_from(Value::Text("x".to_string())),
            Err(GpkgError::ValueTypeMismatch { expected: "integer", actual: "text" })
        ));
        assert!(matches!(
            i16::try_from(Value::Integer(70_000)),
            Err(GpkgError::ValueOutOfRange { target: "i16" })
        ));
        assert!(matches!(
            bool::try_from(Value::Integer(2)),
            Err(GpkgError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn column_type_names() {
        assert_eq!(ColumnType::from_name("GUID"), Some(ColumnType::Guid));
        assert_eq!(ColumnType::from_name("Short"), Some(ColumnType::Short));
        assert_eq!(ColumnType::from_name("geometry"), None);
    }
}
