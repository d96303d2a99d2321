//! Scalar values, column type tags and bound parameter descriptors.
//!
//! `SqlValue` is the closed union of every scalar the engine can bind into a
//! statement or read back out of a row. `ColumnType` is the matching closed
//! tag declared on a field mapping; one generic dispatcher in `row` coerces a
//! stored `SqlValue` to its declared `ColumnType` instead of one hand-written
//! reader per primitive width.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use uuid::Uuid;

/// A scalar value bound into, or read out of, a SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    U8(u8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the carried variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::U8(_) => "u8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Decimal(_) => "decimal",
            Self::String(_) => "string",
            Self::Uuid(_) => "uuid",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
        }
    }

    /// Widen any integer variant to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// RQL query-string rendering, used when pagination links serialize a
/// rewritten tree back into a URL.
impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::Date(v) => write!(f, "{v}"),
            Self::Time(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        Self::F32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        Self::Decimal(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

/// Declared physical type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    String,
    Uuid,
    DateTime,
    Date,
    Time,
}

/// Wire type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    VarChar,
    NVarChar,
    UniqueIdentifier,
    DateTime2,
    Date,
    Time,
}

impl SqlType {
    /// Wire type matching a declared column type. String columns resolve to
    /// `VarChar`/`NVarChar` through the field's encoding, handled by the
    /// parameter builder; this fallback uses `NVarChar`.
    pub fn for_column(ty: ColumnType) -> Self {
        match ty {
            ColumnType::Bool => Self::Bit,
            ColumnType::TinyInt => Self::TinyInt,
            ColumnType::SmallInt => Self::SmallInt,
            ColumnType::Int => Self::Int,
            ColumnType::BigInt => Self::BigInt,
            ColumnType::Real => Self::Real,
            ColumnType::Float => Self::Float,
            ColumnType::Decimal => Self::Decimal,
            ColumnType::String => Self::NVarChar,
            ColumnType::Uuid => Self::UniqueIdentifier,
            ColumnType::DateTime => Self::DateTime2,
            ColumnType::Date => Self::Date,
            ColumnType::Time => Self::Time,
        }
    }

    /// Wire type inferred from a concrete value. `Null` has no inherent type;
    /// callers fall back to [`SqlType::for_column`] on the field's declaration.
    pub fn infer(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Null => None,
            SqlValue::Bool(_) => Some(Self::Bit),
            SqlValue::U8(_) => Some(Self::TinyInt),
            SqlValue::I16(_) => Some(Self::SmallInt),
            SqlValue::I32(_) => Some(Self::Int),
            SqlValue::I64(_) => Some(Self::BigInt),
            SqlValue::F32(_) => Some(Self::Real),
            SqlValue::F64(_) => Some(Self::Float),
            SqlValue::Decimal(_) => Some(Self::Decimal),
            SqlValue::String(_) => Some(Self::NVarChar),
            SqlValue::Uuid(_) => Some(Self::UniqueIdentifier),
            SqlValue::DateTime(_) => Some(Self::DateTime2),
            SqlValue::Date(_) => Some(Self::Date),
            SqlValue::Time(_) => Some(Self::Time),
        }
    }
}

/// A bound parameter: positional name, wire type, optional declared width
/// and the value itself. Names are assigned at bind time (`@P0`, `@P1`, ...)
/// and stay stable between SQL text emission and execution.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlParameter {
    pub name: String,
    pub ty: SqlType,
    pub size: Option<u32>,
    pub value: SqlValue,
}
