//! Static field-mapping tables.
//!
//! One [`EntityMapping`] per entity type describes the primary table, every
//! mapped field and the declared joins. Mappings are plain data built once
//! (typically inside a `LazyLock`) and handed to the emitter and materializer
//! by reference; there is no runtime introspection.

use crate::rql::CompareOp;
use crate::value::ColumnType;

/// Character encoding of a string column, selecting `VarChar` vs `NVarChar`
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Ascii,
    Unicode,
}

/// How an enum field is stored in its column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumEncoding {
    /// Stored as a declared string tag, matched case-insensitively on read.
    StringTag,
    /// Stored as the member's integer code at the column's declared width.
    IntegerCode,
}

/// One member of an enum-typed field: the logical name the entity sees, the
/// string tag stored under `StringTag` encoding and the integer code stored
/// under `IntegerCode` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumMember {
    pub name: &'static str,
    pub tag: &'static str,
    pub code: i64,
}

/// Enum metadata attached to a field mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumSpec {
    pub encoding: EnumEncoding,
    pub members: &'static [EnumMember],
}

impl EnumSpec {
    pub fn by_name(&self, name: &str) -> Option<&'static EnumMember> {
        self.members.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn by_tag(&self, tag: &str) -> Option<&'static EnumMember> {
        self.members.iter().find(|m| m.tag.eq_ignore_ascii_case(tag))
    }

    pub fn by_code(&self, code: i64) -> Option<&'static EnumMember> {
        self.members.iter().find(|m| m.code == code)
    }
}

/// Mapping of one logical field onto a physical column.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub field: &'static str,
    pub column: &'static str,
    /// Table override for join-sourced fields; `None` falls back to the
    /// entity's primary table.
    pub table: Option<&'static str>,
    /// Schema override; `None` falls back to the entity's primary schema.
    pub schema: Option<&'static str>,
    pub primary_key: bool,
    pub identity: bool,
    pub nullable: bool,
    pub column_type: ColumnType,
    pub encoding: StringEncoding,
    pub max_length: Option<u32>,
    pub enum_spec: Option<EnumSpec>,
}

impl FieldMapping {
    pub fn new(field: &'static str, column: &'static str, column_type: ColumnType) -> Self {
        Self {
            field,
            column,
            table: None,
            schema: None,
            primary_key: false,
            identity: false,
            nullable: false,
            column_type,
            encoding: StringEncoding::Unicode,
            max_length: None,
            enum_spec: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Unicode string column with a declared maximum length.
    pub fn unicode(mut self, max_length: u32) -> Self {
        self.encoding = StringEncoding::Unicode;
        self.max_length = Some(max_length);
        self
    }

    /// ASCII string column with a declared maximum length.
    pub fn ascii(mut self, max_length: u32) -> Self {
        self.encoding = StringEncoding::Ascii;
        self.max_length = Some(max_length);
        self
    }

    /// Source this field from a joined table instead of the primary one.
    pub fn from_table(mut self, schema: &'static str, table: &'static str) -> Self {
        self.schema = Some(schema);
        self.table = Some(table);
        self
    }

    pub fn enumeration(mut self, spec: EnumSpec) -> Self {
        self.enum_spec = Some(spec);
        self
    }
}

/// Join type rendered into the FROM clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    RightOuter,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT OUTER JOIN",
            Self::RightOuter => "RIGHT OUTER JOIN",
        }
    }
}

/// Combinator preceding a join predicate. Ignored for the first predicate of
/// a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCombinator {
    And,
    Or,
}

impl JoinCombinator {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Right-hand side of a join predicate.
#[derive(Debug, Clone)]
pub enum JoinRef {
    /// Cross-reference to a column of another table. `table: None` targets
    /// the entity's primary table.
    Field {
        schema: Option<&'static str>,
        table: Option<&'static str>,
        field: &'static str,
    },
    /// Literal bound as a parameter, sized through the named mapped field.
    /// The literal string `"null"` renders as SQL NULL instead of binding.
    Literal {
        field: &'static str,
        value: &'static str,
    },
}

/// One element of a join's ordered ON-clause sequence, rendered left to
/// right. `BeginGroup`/`EndGroup` open and close a parenthesized sub-group.
#[derive(Debug, Clone)]
pub enum JoinCondition {
    BeginGroup,
    EndGroup,
    Predicate {
        combinator: JoinCombinator,
        source_field: &'static str,
        op: CompareOp,
        reference: JoinRef,
    },
}

/// One declared join of an entity mapping.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub schema: Option<&'static str>,
    pub table: &'static str,
    pub conditions: Vec<JoinCondition>,
}

impl JoinSpec {
    pub fn new(kind: JoinKind, schema: &'static str, table: &'static str) -> Self {
        Self {
            kind,
            schema: if schema.is_empty() { None } else { Some(schema) },
            table,
            conditions: Vec::new(),
        }
    }

    pub fn condition(mut self, condition: JoinCondition) -> Self {
        self.conditions.push(condition);
        self
    }
}

/// Mapping of one entity type onto its primary table, fields and joins.
#[derive(Debug, Clone)]
pub struct EntityMapping {
    pub schema: &'static str,
    pub table: &'static str,
    pub fields: Vec<FieldMapping>,
    pub joins: Vec<JoinSpec>,
}

impl EntityMapping {
    pub fn new(schema: &'static str, table: &'static str) -> Self {
        Self {
            schema,
            table,
            fields: Vec::new(),
            joins: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldMapping) -> Self {
        self.fields.push(field);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    /// Case-insensitive field lookup by logical name.
    pub fn find_field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field.eq_ignore_ascii_case(name))
    }

    /// Effective schema of a field, falling back to the entity's schema.
    pub fn effective_schema(&self, field: &FieldMapping) -> &str {
        field.schema.unwrap_or(self.schema)
    }

    /// Effective table of a field, falling back to the primary table.
    pub fn effective_table(&self, field: &FieldMapping) -> &str {
        field.table.unwrap_or(self.table)
    }

    /// A field sourced from a table other than the primary one is foreign:
    /// selectable through a join but excluded from INSERT/UPDATE lists.
    pub fn is_foreign(&self, field: &FieldMapping) -> bool {
        self.effective_table(field) != self.table
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.primary_key)
    }

    pub fn identity_field(&self) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget() -> EntityMapping {
        EntityMapping::new("dbo", "Widget")
            .field(
                FieldMapping::new("Id", "Id", ColumnType::Int)
                    .primary_key()
                    .identity(),
            )
            .field(FieldMapping::new("Name", "Name", ColumnType::String).unicode(50))
            .field(
                FieldMapping::new("SupplierName", "Name", ColumnType::String)
                    .from_table("dbo", "Supplier"),
            )
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let mapping = widget();
        assert!(mapping.find_field("name").is_some());
        assert!(mapping.find_field("NAME").is_some());
        assert!(mapping.find_field("Label").is_none());
    }

    #[test]
    fn effective_names_fall_back_to_entity() {
        let mapping = widget();
        let name = mapping.find_field("Name").unwrap();
        assert_eq!(mapping.effective_schema(name), "dbo");
        assert_eq!(mapping.effective_table(name), "Widget");
        assert!(!mapping.is_foreign(name));

        let supplier = mapping.find_field("SupplierName").unwrap();
        assert_eq!(mapping.effective_table(supplier), "Supplier");
        assert!(mapping.is_foreign(supplier));
    }

    #[test]
    fn primary_keys_and_identity() {
        let mapping = widget();
        let pks: Vec<_> = mapping.primary_keys().map(|f| f.field).collect();
        assert_eq!(pks, vec!["Id"]);
        assert_eq!(mapping.identity_field().map(|f| f.field), Some("Id"));
    }

    #[test]
    fn enum_spec_lookups() {
        static MEMBERS: [EnumMember; 2] = [
            EnumMember { name: "Active", tag: "ACT", code: 1 },
            EnumMember { name: "Retired", tag: "RET", code: 2 },
        ];
        let spec = EnumSpec {
            encoding: EnumEncoding::StringTag,
            members: &MEMBERS,
        };
        assert_eq!(spec.by_tag("act").map(|m| m.name), Some("Active"));
        assert_eq!(spec.by_code(2).map(|m| m.name), Some("Retired"));
        assert!(spec.by_tag("XXX").is_none());
    }
}
