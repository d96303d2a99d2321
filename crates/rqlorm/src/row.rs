//! Result materialization: turning result-set rows back into entities.
//!
//! The [`Row`] trait is the narrow seam a database driver implements; the
//! free functions here decode one row into one entity under the same
//! projection rules the emitter applied when it built the query, so a field
//! the query never selected is simply left at its default.

use crate::entity::Entity;
use crate::error::{RepoResult, RqlError};
use crate::mapping::{EnumEncoding, FieldMapping};
use crate::rql::{RqlKind, RqlNode};
use crate::value::{ColumnType, SqlValue};

/// One row of a result set, keyed by output column name.
pub trait Row: Send {
    /// Look up a column's value by name, case-insensitively. `None` means
    /// the column is absent from the row, which is distinct from a present
    /// NULL.
    fn value(&self, column: &str) -> Option<&SqlValue>;
}

/// Boxed row handed back by an executor's result stream.
pub type BoxRow = Box<dyn Row + Send + Sync>;

/// In-memory [`Row`] backed by name/value pairs.
#[derive(Debug, Clone, Default)]
pub struct ValueRow {
    columns: Vec<(String, SqlValue)>,
}

impl ValueRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }
}

impl Row for ValueRow {
    fn value(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }
}

/// Decode one row into an entity.
///
/// The RQL tree that produced the query decides what gets populated: when it
/// carries aggregate clauses only the first aggregate's target field is
/// read; otherwise every mapped field passes the SELECT allowlist filter
/// (primary keys always included) and is read by its logical field name,
/// falling back to its column name. Fields absent from the row keep their
/// default value.
pub fn read_entity<T: Entity>(row: &dyn Row, node: Option<&RqlNode>) -> RepoResult<T> {
    let mapping = T::mapping();
    let mut item = T::default();

    let aggregates = node.map(RqlNode::extract_aggregates).unwrap_or_default();
    if let Some(RqlNode::Aggregate { field, .. }) = aggregates.first() {
        let fm = mapping.find_field(field).ok_or_else(|| {
            RqlError::invalid_operation(format!(
                "Malformed RQL query: {field} is not a member of {}",
                mapping.table
            ))
        })?;
        if let Some(raw) = row.value(fm.field).or_else(|| row.value(fm.column)) {
            let value = read_column(fm, raw)?;
            item.set(fm.field, value)?;
        }
        return Ok(item);
    }

    let allowlist = match node.and_then(|n| n.extract_clause(RqlKind::Select)) {
        Some(RqlNode::Select { fields }) if !fields.is_empty() => Some(fields.as_slice()),
        _ => None,
    };

    for field in &mapping.fields {
        let selected = match allowlist {
            None => true,
            Some(list) => {
                field.primary_key
                    || list.iter().any(|name| name.eq_ignore_ascii_case(field.field))
            }
        };
        if !selected {
            continue;
        }
        let Some(raw) = row.value(field.field).or_else(|| row.value(field.column)) else {
            continue;
        };
        let value = read_column(field, raw)?;
        item.set(field.field, value)?;
    }
    Ok(item)
}

/// Read the `[RecordCount]` column a collection count query projects.
pub fn read_record_count(row: &dyn Row) -> RepoResult<u64> {
    let value = row
        .value("RecordCount")
        .ok_or_else(|| RqlError::db("count query returned no RecordCount column"))?;
    let n = value.as_i64().ok_or_else(|| {
        RqlError::invalid_cast("RecordCount", format!("expected integer, got {}", value.type_name()))
    })?;
    u64::try_from(n)
        .map_err(|_| RqlError::invalid_cast("RecordCount", format!("negative count {n}")))
}

/// Decode one raw column value into the field's declared representation.
///
/// The dispatch is closed over [`ColumnType`]: integer families convert
/// across widths with a range check, everything else requires its exact
/// variant (UUIDs additionally parse from strings). Enum fields translate
/// the stored tag or code back into the member name; an unrecognized stored
/// value is bad data, not a cast failure. NULL in a non-nullable column is a
/// cast failure.
pub fn read_column(field: &FieldMapping, raw: &SqlValue) -> RepoResult<SqlValue> {
    if raw.is_null() {
        if field.nullable {
            return Ok(SqlValue::Null);
        }
        return Err(RqlError::invalid_cast(
            field.column,
            "NULL in a non-nullable column",
        ));
    }

    if let Some(spec) = field.enum_spec {
        let member = match spec.encoding {
            EnumEncoding::StringTag => {
                let tag = raw.as_str().ok_or_else(|| cast(field, raw, "string tag"))?;
                spec.by_tag(tag).ok_or_else(|| {
                    RqlError::invalid_data(
                        field.column,
                        format!("'{tag}' is not a recognized enum tag"),
                    )
                })?
            }
            EnumEncoding::IntegerCode => {
                let code = raw.as_i64().ok_or_else(|| cast(field, raw, "integer code"))?;
                spec.by_code(code).ok_or_else(|| {
                    RqlError::invalid_data(
                        field.column,
                        format!("{code} is not a recognized enum code"),
                    )
                })?
            }
        };
        return Ok(SqlValue::String(member.name.to_string()));
    }

    match field.column_type {
        ColumnType::Bool => match raw {
            SqlValue::Bool(b) => Ok(SqlValue::Bool(*b)),
            _ => Err(cast(field, raw, "bool")),
        },
        ColumnType::TinyInt => {
            let n = integer(field, raw)?;
            u8::try_from(n)
                .map(SqlValue::U8)
                .map_err(|_| range(field, n, "tinyint"))
        }
        ColumnType::SmallInt => {
            let n = integer(field, raw)?;
            i16::try_from(n)
                .map(SqlValue::I16)
                .map_err(|_| range(field, n, "smallint"))
        }
        ColumnType::Int => {
            let n = integer(field, raw)?;
            i32::try_from(n)
                .map(SqlValue::I32)
                .map_err(|_| range(field, n, "int"))
        }
        ColumnType::BigInt => Ok(SqlValue::I64(integer(field, raw)?)),
        ColumnType::Real => match raw {
            SqlValue::F32(f) => Ok(SqlValue::F32(*f)),
            SqlValue::F64(f) => Ok(SqlValue::F32(*f as f32)),
            _ => Err(cast(field, raw, "real")),
        },
        ColumnType::Float => match raw {
            SqlValue::F64(f) => Ok(SqlValue::F64(*f)),
            SqlValue::F32(f) => Ok(SqlValue::F64(f64::from(*f))),
            _ => Err(cast(field, raw, "float")),
        },
        ColumnType::Decimal => match raw {
            SqlValue::Decimal(d) => Ok(SqlValue::Decimal(*d)),
            _ => Err(cast(field, raw, "decimal")),
        },
        ColumnType::String => match raw {
            SqlValue::String(s) => Ok(SqlValue::String(s.clone())),
            _ => Err(cast(field, raw, "string")),
        },
        ColumnType::Uuid => match raw {
            SqlValue::Uuid(u) => Ok(SqlValue::Uuid(*u)),
            SqlValue::String(s) => s
                .parse()
                .map(SqlValue::Uuid)
                .map_err(|_| cast(field, raw, "uuid")),
            _ => Err(cast(field, raw, "uuid")),
        },
        ColumnType::DateTime => match raw {
            SqlValue::DateTime(dt) => Ok(SqlValue::DateTime(*dt)),
            _ => Err(cast(field, raw, "datetime")),
        },
        ColumnType::Date => match raw {
            SqlValue::Date(d) => Ok(SqlValue::Date(*d)),
            _ => Err(cast(field, raw, "date")),
        },
        ColumnType::Time => match raw {
            SqlValue::Time(t) => Ok(SqlValue::Time(*t)),
            _ => Err(cast(field, raw, "time")),
        },
    }
}

fn integer(field: &FieldMapping, raw: &SqlValue) -> RepoResult<i64> {
    raw.as_i64().ok_or_else(|| cast(field, raw, "integer"))
}

fn cast(field: &FieldMapping, raw: &SqlValue, wanted: &str) -> RqlError {
    RqlError::invalid_cast(
        field.column,
        format!("expected {wanted}, got {}", raw.type_name()),
    )
}

fn range(field: &FieldMapping, n: i64, wanted: &str) -> RqlError {
    RqlError::invalid_cast(field.column, format!("{n} does not fit in a {wanted}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rql::AggregateFn;
    use crate::testutil::{Gadget, Widget};
    use rust_decimal::Decimal;

    #[test]
    fn full_row_populates_every_field() {
        let row = ValueRow::new()
            .with("Id", 7_i32)
            .with("Name", "Bolt")
            .with("Price", Decimal::new(150, 2));
        let item: Widget = read_entity(&row, None).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.name, "Bolt");
        assert_eq!(item.price, Decimal::new(150, 2));
    }

    #[test]
    fn allowlist_skips_unselected_fields_but_keeps_primary_keys() {
        let node = RqlNode::Select {
            fields: vec!["Name".into()],
        };
        let row = ValueRow::new()
            .with("Id", 7_i32)
            .with("Name", "Bolt")
            .with("Price", Decimal::new(150, 2));
        let item: Widget = read_entity(&row, Some(&node)).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.name, "Bolt");
        assert_eq!(item.price, Decimal::ZERO);
    }

    #[test]
    fn absent_columns_leave_defaults() {
        let row = ValueRow::new().with("Id", 7_i32);
        let item: Widget = read_entity(&row, None).unwrap();
        assert_eq!(item.id, 7);
        assert_eq!(item.name, "");
    }

    #[test]
    fn aggregate_rows_populate_only_the_target_field() {
        let node = RqlNode::Aggregate {
            func: AggregateFn::Sum,
            field: "Price".into(),
        };
        let row = ValueRow::new()
            .with("Price", Decimal::new(975, 2))
            .with("Id", 99_i32);
        let item: Widget = read_entity(&row, Some(&node)).unwrap();
        assert_eq!(item.price, Decimal::new(975, 2));
        assert_eq!(item.id, 0);
    }

    #[test]
    fn null_in_nullable_column_decodes_to_none() {
        let row = ValueRow::new()
            .with("Id", 1_i32)
            .with("Label", "Gizmo")
            .with("Color", SqlValue::Null)
            .with("SupplierId", 5_i32);
        let item: Gadget = read_entity(&row, None).unwrap();
        assert_eq!(item.color, None);
    }

    #[test]
    fn null_in_non_nullable_column_is_a_cast_error() {
        let row = ValueRow::new().with("Id", 1_i32).with("Label", SqlValue::Null);
        let err = read_entity::<Gadget>(&row, None).unwrap_err();
        assert_eq!(err.reason(), "exception");
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn enum_tags_decode_to_member_names() {
        let row = ValueRow::new()
            .with("Id", 1_i32)
            .with("Label", "Gizmo")
            .with("Status", "ret")
            .with("Grade", SqlValue::I16(1))
            .with("SupplierId", 5_i32);
        let item: Gadget = read_entity(&row, None).unwrap();
        assert_eq!(item.status.as_deref(), Some("Retired"));
        assert_eq!(item.grade.as_deref(), Some("A"));
    }

    #[test]
    fn unknown_enum_tag_is_bad_data() {
        let row = ValueRow::new()
            .with("Id", 1_i32)
            .with("Label", "Gizmo")
            .with("Status", "ZZZ")
            .with("SupplierId", 5_i32);
        let err = read_entity::<Gadget>(&row, None).unwrap_err();
        assert!(err.is_invalid_data());
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn integers_convert_across_widths_with_a_range_check() {
        let mapping = Widget::mapping();
        let id = mapping.find_field("Id").unwrap();
        assert_eq!(read_column(id, &SqlValue::I64(7)).unwrap(), SqlValue::I32(7));
        let err = read_column(id, &SqlValue::I64(i64::MAX)).unwrap_err();
        assert_eq!(err.reason(), "exception");
    }

    #[test]
    fn record_count_reads_the_projected_column() {
        let row = ValueRow::new().with("RecordCount", 250_i64);
        assert_eq!(read_record_count(&row).unwrap(), 250);
        let empty = ValueRow::new();
        assert!(read_record_count(&empty).is_err());
    }
}
