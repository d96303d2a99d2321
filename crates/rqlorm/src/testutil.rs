//! Shared entity fixtures for unit tests.

use std::sync::LazyLock;

use rust_decimal::Decimal;

use crate::entity::Entity;
use crate::error::{RepoResult, RqlError};
use crate::mapping::{
    EntityMapping, EnumEncoding, EnumMember, EnumSpec, FieldMapping, JoinCombinator,
    JoinCondition, JoinKind, JoinRef, JoinSpec,
};
use crate::rql::CompareOp;
use crate::value::{ColumnType, SqlValue};

pub static WIDGET_MAPPING: LazyLock<EntityMapping> = LazyLock::new(|| {
    EntityMapping::new("dbo", "Widget")
        .field(
            FieldMapping::new("Id", "Id", ColumnType::Int)
                .primary_key()
                .identity(),
        )
        .field(FieldMapping::new("Name", "Name", ColumnType::String).unicode(50))
        .field(FieldMapping::new("Price", "Price", ColumnType::Decimal))
});

/// Minimal three-field entity used by most statement-shape tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget {
    pub id: i32,
    pub name: String,
    pub price: Decimal,
}

impl Entity for Widget {
    fn mapping() -> &'static EntityMapping {
        &WIDGET_MAPPING
    }

    fn get(&self, field: &str) -> SqlValue {
        if field.eq_ignore_ascii_case("Id") {
            SqlValue::I32(self.id)
        } else if field.eq_ignore_ascii_case("Name") {
            SqlValue::String(self.name.clone())
        } else if field.eq_ignore_ascii_case("Price") {
            SqlValue::Decimal(self.price)
        } else {
            SqlValue::Null
        }
    }

    fn set(&mut self, field: &str, value: SqlValue) -> RepoResult<()> {
        if field.eq_ignore_ascii_case("Id") {
            self.id = expect_i32(field, &value)?;
        } else if field.eq_ignore_ascii_case("Name") {
            self.name = expect_string(field, value)?;
        } else if field.eq_ignore_ascii_case("Price") {
            match value {
                SqlValue::Decimal(d) => self.price = d,
                other => {
                    return Err(RqlError::invalid_cast(
                        field,
                        format!("expected decimal, got {}", other.type_name()),
                    ));
                }
            }
        }
        Ok(())
    }
}

static STATUS_MEMBERS: [EnumMember; 2] = [
    EnumMember {
        name: "Active",
        tag: "ACT",
        code: 1,
    },
    EnumMember {
        name: "Retired",
        tag: "RET",
        code: 2,
    },
];

static GRADE_MEMBERS: [EnumMember; 2] = [
    EnumMember {
        name: "A",
        tag: "A",
        code: 1,
    },
    EnumMember {
        name: "B",
        tag: "B",
        code: 2,
    },
];

pub static GADGET_MAPPING: LazyLock<EntityMapping> = LazyLock::new(|| {
    EntityMapping::new("dbo", "Gadget")
        .field(
            FieldMapping::new("Id", "Id", ColumnType::Int)
                .primary_key()
                .identity(),
        )
        .field(FieldMapping::new("Label", "Label", ColumnType::String).unicode(30))
        .field(
            FieldMapping::new("Color", "Color", ColumnType::String)
                .unicode(20)
                .nullable(),
        )
        .field(
            FieldMapping::new("Status", "Status", ColumnType::String)
                .unicode(10)
                .nullable()
                .enumeration(EnumSpec {
                    encoding: EnumEncoding::StringTag,
                    members: &STATUS_MEMBERS,
                }),
        )
        .field(
            FieldMapping::new("Grade", "Grade", ColumnType::SmallInt)
                .nullable()
                .enumeration(EnumSpec {
                    encoding: EnumEncoding::IntegerCode,
                    members: &GRADE_MEMBERS,
                }),
        )
        .field(FieldMapping::new("SupplierId", "SupplierId", ColumnType::Int))
        .field(
            FieldMapping::new("SupplierName", "Name", ColumnType::String)
                .unicode(50)
                .from_table("dbo", "Supplier"),
        )
        .join(
            JoinSpec::new(JoinKind::Inner, "dbo", "Supplier").condition(
                JoinCondition::Predicate {
                    combinator: JoinCombinator::And,
                    source_field: "Id",
                    op: CompareOp::Eq,
                    reference: JoinRef::Field {
                        schema: None,
                        table: None,
                        field: "SupplierId",
                    },
                },
            ),
        )
});

/// Wider entity with nullable, enum-typed and join-sourced fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gadget {
    pub id: i32,
    pub label: String,
    pub color: Option<String>,
    /// Member name of the status enum.
    pub status: Option<String>,
    /// Member name of the grade enum.
    pub grade: Option<String>,
    pub supplier_id: i32,
    pub supplier_name: Option<String>,
}

impl Entity for Gadget {
    fn mapping() -> &'static EntityMapping {
        &GADGET_MAPPING
    }

    fn get(&self, field: &str) -> SqlValue {
        if field.eq_ignore_ascii_case("Id") {
            SqlValue::I32(self.id)
        } else if field.eq_ignore_ascii_case("Label") {
            SqlValue::String(self.label.clone())
        } else if field.eq_ignore_ascii_case("Color") {
            opt_string(&self.color)
        } else if field.eq_ignore_ascii_case("Status") {
            opt_string(&self.status)
        } else if field.eq_ignore_ascii_case("Grade") {
            opt_string(&self.grade)
        } else if field.eq_ignore_ascii_case("SupplierId") {
            SqlValue::I32(self.supplier_id)
        } else if field.eq_ignore_ascii_case("SupplierName") {
            opt_string(&self.supplier_name)
        } else {
            SqlValue::Null
        }
    }

    fn set(&mut self, field: &str, value: SqlValue) -> RepoResult<()> {
        if field.eq_ignore_ascii_case("Id") {
            self.id = expect_i32(field, &value)?;
        } else if field.eq_ignore_ascii_case("Label") {
            self.label = expect_string(field, value)?;
        } else if field.eq_ignore_ascii_case("Color") {
            self.color = expect_opt_string(field, value)?;
        } else if field.eq_ignore_ascii_case("Status") {
            self.status = expect_opt_string(field, value)?;
        } else if field.eq_ignore_ascii_case("Grade") {
            self.grade = expect_opt_string(field, value)?;
        } else if field.eq_ignore_ascii_case("SupplierId") {
            self.supplier_id = expect_i32(field, &value)?;
        } else if field.eq_ignore_ascii_case("SupplierName") {
            self.supplier_name = expect_opt_string(field, value)?;
        }
        Ok(())
    }
}

fn opt_string(value: &Option<String>) -> SqlValue {
    match value {
        Some(s) => SqlValue::String(s.clone()),
        None => SqlValue::Null,
    }
}

fn expect_i32(field: &str, value: &SqlValue) -> RepoResult<i32> {
    let n = value.as_i64().ok_or_else(|| {
        RqlError::invalid_cast(field, format!("expected integer, got {}", value.type_name()))
    })?;
    i32::try_from(n)
        .map_err(|_| RqlError::invalid_cast(field, format!("{n} does not fit in an i32")))
}

fn expect_string(field: &str, value: SqlValue) -> RepoResult<String> {
    match value {
        SqlValue::String(s) => Ok(s),
        other => Err(RqlError::invalid_cast(
            field,
            format!("expected string, got {}", other.type_name()),
        )),
    }
}

fn expect_opt_string(field: &str, value: SqlValue) -> RepoResult<Option<String>> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::String(s) => Ok(Some(s)),
        other => Err(RqlError::invalid_cast(
            field,
            format!("expected string, got {}", other.type_name()),
        )),
    }
}
