//! Query emitter: compiles a field mapping plus an RQL tree into one SQL
//! statement and its bound parameter list.
//!
//! Every builder is a pure function of mapping + tree + item; failures are
//! synchronous and abort the build, never returning partial SQL. Statement
//! shapes target a SQL Server-flavored dialect (bracket-quoted identifiers,
//! `@P<n>` placeholders, `TOP 1`, `OUTPUT inserted.[..]`, `ROW_NUMBER()`
//! windowing); the read-uncommitted table hint is a configuration knob.

use crate::entity::Entity;
use crate::error::{RepoResult, RqlError};
use crate::mapping::{
    EntityMapping, FieldMapping, JoinCondition, JoinRef, StringEncoding,
};
use crate::rql::{RqlKind, RqlNode};
use crate::sql::{quote_path, quote_table, Sql};
use crate::value::{ColumnType, SqlType, SqlValue};

/// Explicit emitter configuration; nothing is looked up ambiently.
#[derive(Debug, Clone, Copy)]
pub struct EmitterOptions {
    /// Ceiling on the number of rows a collection window may request.
    pub batch_limit: u64,
    /// Emit `WITH(NOLOCK)` on SELECT sources.
    pub read_uncommitted: bool,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            read_uncommitted: true,
        }
    }
}

/// One operation of a PATCH request. `Replace` and `Add` are synonymous at
/// the SQL level; `Remove` sets the column to NULL. Primary-key fields are
/// silently skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    Replace { field: String, value: SqlValue },
    Add { field: String, value: SqlValue },
    Remove { field: String },
}

impl PatchOp {
    fn field(&self) -> &str {
        match self {
            Self::Replace { field, .. } | Self::Add { field, .. } | Self::Remove { field } => field,
        }
    }
}

/// The SQL statement generator.
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    options: EmitterOptions,
}

impl Emitter {
    pub fn new(options: EmitterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EmitterOptions {
        &self.options
    }

    fn check_mapping(&self, mapping: &EntityMapping) -> RepoResult<()> {
        if mapping.table.is_empty() {
            return Err(RqlError::schema("type carries no table mapping"));
        }
        Ok(())
    }

    fn table_hint(&self) -> &'static str {
        if self.options.read_uncommitted {
            " WITH(NOLOCK)"
        } else {
            ""
        }
    }

    fn field_path(&self, mapping: &EntityMapping, field: &FieldMapping) -> RepoResult<String> {
        quote_path(
            mapping.effective_schema(field),
            mapping.effective_table(field),
            field.column,
        )
    }

    /// Resolve an RQL field reference, case-insensitively.
    fn resolve_field<'a>(
        &self,
        mapping: &'a EntityMapping,
        name: &str,
    ) -> RepoResult<&'a FieldMapping> {
        mapping.find_field(name).ok_or_else(|| {
            RqlError::invalid_operation(format!(
                "Malformed RQL query: {name} is not a member of {}",
                mapping.table
            ))
        })
    }

    /// Resolve a caller-supplied key name; keys must belong to the primary
    /// table.
    fn resolve_key<'a>(
        &self,
        mapping: &'a EntityMapping,
        name: &str,
    ) -> RepoResult<&'a FieldMapping> {
        let field = mapping.find_field(name).ok_or_else(|| {
            RqlError::bad_request(format!(
                "key field {name} is not a member of {}",
                mapping.table
            ))
        })?;
        if mapping.is_foreign(field) {
            return Err(RqlError::bad_request(format!(
                "key field {name} is not a member of {}",
                mapping.table
            )));
        }
        Ok(field)
    }

    /// Convert a field value into a correctly typed and sized parameter
    /// descriptor: `(wire type, declared width, value)`.
    ///
    /// String fields size by declared max length, falling back to the value's
    /// own length (minimum 1). Enum fields translate the member name into the
    /// stored representation. Everything else passes through with its
    /// inferred type, or the column's declared type when the value is NULL.
    pub fn build_sql_parameter(
        &self,
        field: &FieldMapping,
        value: &SqlValue,
    ) -> RepoResult<(SqlType, Option<u32>, SqlValue)> {
        if let Some(spec) = field.enum_spec {
            if value.is_null() {
                let ty = match spec.encoding {
                    crate::mapping::EnumEncoding::StringTag => self.string_type(field),
                    crate::mapping::EnumEncoding::IntegerCode => {
                        SqlType::for_column(field.column_type)
                    }
                };
                return Ok((ty, field.max_length, SqlValue::Null));
            }
            let Some(name) = value.as_str() else {
                return Err(RqlError::bad_request(format!(
                    "enum field {} expects a member name, got {}",
                    field.field,
                    value.type_name()
                )));
            };
            let member = spec.by_name(name).ok_or_else(|| {
                RqlError::bad_request(format!(
                    "'{name}' is not a member of enum field {}",
                    field.field
                ))
            })?;
            return Ok(match spec.encoding {
                crate::mapping::EnumEncoding::StringTag => {
                    let size = field.max_length.unwrap_or(member.tag.len().max(1) as u32);
                    (self.string_type(field), Some(size), SqlValue::String(member.tag.to_string()))
                }
                crate::mapping::EnumEncoding::IntegerCode => {
                    let value = match field.column_type {
                        ColumnType::TinyInt => SqlValue::U8(member.code as u8),
                        ColumnType::SmallInt => SqlValue::I16(member.code as i16),
                        ColumnType::BigInt => SqlValue::I64(member.code),
                        _ => SqlValue::I32(member.code as i32),
                    };
                    (SqlType::for_column(field.column_type), None, value)
                }
            });
        }

        if field.column_type == ColumnType::String {
            let ty = self.string_type(field);
            return Ok(match value {
                SqlValue::Null => (ty, field.max_length.or(Some(1)), SqlValue::Null),
                SqlValue::String(s) => {
                    let size = field.max_length.unwrap_or(s.len().max(1) as u32);
                    (ty, Some(size), SqlValue::String(s.clone()))
                }
                other => {
                    let s = other.to_string();
                    let size = field.max_length.unwrap_or(s.len().max(1) as u32);
                    (ty, Some(size), SqlValue::String(s))
                }
            });
        }

        let ty = SqlType::infer(value).unwrap_or_else(|| SqlType::for_column(field.column_type));
        Ok((ty, None, value.clone()))
    }

    fn string_type(&self, field: &FieldMapping) -> SqlType {
        match field.encoding {
            StringEncoding::Unicode => SqlType::NVarChar,
            StringEncoding::Ascii => SqlType::VarChar,
        }
    }

    /// Register one field-typed parameter and return its positional name.
    fn bind_field(
        &self,
        sql: &mut Sql,
        field: &FieldMapping,
        value: &SqlValue,
    ) -> RepoResult<String> {
        let (ty, size, value) = self.build_sql_parameter(field, value)?;
        Ok(sql.bind(ty, size, value))
    }

    // ==================== WHERE / ORDER BY compilation ====================

    /// Recursive-descent WHERE compilation.
    ///
    /// `parent` is the combinator of the enclosing AND/OR, `None` at the
    /// root. A root-level AND/OR is never parenthesized; a nested one always
    /// is — that asymmetry carries operator precedence. Non-predicate node
    /// kinds compile to the empty string and are skipped by their parent.
    pub fn parse_where_clause(
        &self,
        mapping: &EntityMapping,
        node: Option<&RqlNode>,
        parent: Option<&str>,
        sql: &mut Sql,
    ) -> RepoResult<String> {
        let Some(node) = node else {
            return Ok(String::new());
        };

        match node {
            RqlNode::And(children) | RqlNode::Or(children) => {
                let (keyword, child_op) = if matches!(node, RqlNode::And(_)) {
                    (" AND ", "AND")
                } else {
                    (" OR ", "OR")
                };
                let mut clause = String::new();
                for child in children {
                    let sub = self.parse_where_clause(mapping, Some(child), Some(child_op), sql)?;
                    if sub.is_empty() {
                        continue;
                    }
                    if !clause.is_empty() {
                        clause.push_str(keyword);
                    }
                    clause.push_str(&sub);
                }
                if clause.is_empty() || parent.is_none() {
                    Ok(clause)
                } else {
                    Ok(format!("({clause})"))
                }
            }

            RqlNode::Compare { op, field, value } => {
                let fm = self.resolve_field(mapping, field)?;
                let path = self.field_path(mapping, fm)?;
                match value {
                    // absent value, explicit NULL and the literal "null" all
                    // degrade EQ/NE to a null test consuming no parameters
                    Some(value) if !is_null_literal(value) => {
                        let name = self.bind_field(sql, fm, value)?;
                        Ok(format!("{path} {} {name}", op.sql()))
                    }
                    _ => {
                        if *op == crate::rql::CompareOp::Ne {
                            Ok(format!("{path} is not null"))
                        } else {
                            Ok(format!("{path} is null"))
                        }
                    }
                }
            }

            RqlNode::In { field, values } | RqlNode::Out { field, values } => {
                let fm = self.resolve_field(mapping, field)?;
                let path = self.field_path(mapping, fm)?;
                if values.is_empty() {
                    return Err(RqlError::bad_request(format!(
                        "IN/OUT on {field} requires at least one value"
                    )));
                }
                let keyword = if matches!(node, RqlNode::In { .. }) {
                    "IN"
                } else {
                    "NOT IN"
                };
                let mut clause = format!("({path} {keyword}(");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        clause.push(',');
                    }
                    clause.push_str(&self.bind_field(sql, fm, value)?);
                }
                clause.push_str("))");
                Ok(clause)
            }

            RqlNode::Contains { field, pattern } | RqlNode::Excludes { field, pattern } => {
                let fm = self.resolve_field(mapping, field)?;
                let path = self.field_path(mapping, fm)?;
                let keyword = if matches!(node, RqlNode::Contains { .. }) {
                    "LIKE"
                } else {
                    "NOT LIKE"
                };
                // RQL wildcards: * matches any run, ? matches one character
                let translated = pattern.replace('*', "%").replace('?', "_");
                let name = self.bind_field(sql, fm, &SqlValue::String(translated))?;
                Ok(format!("({path} {keyword} {name})"))
            }

            _ => Ok(String::new()),
        }
    }

    /// ORDER BY compilation. AND/OR flatten their children into one
    /// comma-joined list — no parenthesization applies to sort terms.
    pub fn parse_order_by_clause(
        &self,
        mapping: &EntityMapping,
        node: Option<&RqlNode>,
    ) -> RepoResult<String> {
        let Some(node) = node else {
            return Ok(String::new());
        };

        match node {
            RqlNode::And(children) | RqlNode::Or(children) => {
                let mut clause = String::new();
                for child in children {
                    let sub = self.parse_order_by_clause(mapping, Some(child))?;
                    if sub.is_empty() {
                        continue;
                    }
                    if !clause.is_empty() {
                        clause.push_str(", ");
                    }
                    clause.push_str(&sub);
                }
                Ok(clause)
            }
            RqlNode::Sort { keys } => {
                let mut clause = String::new();
                for key in keys {
                    let fm = self.resolve_field(mapping, &key.field)?;
                    let path = self.field_path(mapping, fm)?;
                    if !clause.is_empty() {
                        clause.push_str(", ");
                    }
                    clause.push_str(&path);
                    if key.descending {
                        clause.push_str(" desc");
                    }
                }
                Ok(clause)
            }
            _ => Ok(String::new()),
        }
    }

    // ==================== projection helpers ====================

    fn select_allowlist<'a>(node: Option<&'a RqlNode>) -> Option<&'a [String]> {
        match node?.extract_clause(RqlKind::Select) {
            Some(RqlNode::Select { fields }) if !fields.is_empty() => Some(fields),
            _ => None,
        }
    }

    /// Allowlist filter with the primary-key override: a non-empty SELECT
    /// list excludes a field unless it is a primary key.
    fn included(field: &FieldMapping, allowlist: Option<&[String]>) -> bool {
        match allowlist {
            None => true,
            Some(list) => {
                field.primary_key
                    || list.iter().any(|name| name.eq_ignore_ascii_case(field.field))
            }
        }
    }

    /// Column name a projected field materializes under: the column itself,
    /// or the field name when the projection aliases it.
    fn output_name(field: &FieldMapping) -> &'static str {
        if field.column.eq_ignore_ascii_case(field.field) {
            field.column
        } else {
            field.field
        }
    }

    /// Qualified projection list, aliasing columns whose name differs from
    /// the logical field name.
    fn projection(
        &self,
        mapping: &EntityMapping,
        allowlist: Option<&[String]>,
    ) -> RepoResult<String> {
        let mut out = String::new();
        for field in &mapping.fields {
            if !Self::included(field, allowlist) {
                continue;
            }
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str(&self.field_path(mapping, field)?);
            if !field.column.eq_ignore_ascii_case(field.field) {
                out.push_str(&format!(" as [{}]", field.field));
            }
        }
        if out.is_empty() {
            return Err(RqlError::schema("type carries no mapped fields"));
        }
        Ok(out)
    }

    fn distinct_first_prefix(node: Option<&RqlNode>) -> String {
        let mut prefix = String::new();
        if let Some(node) = node {
            if node.extract_clause(RqlKind::Distinct).is_some() {
                prefix.push_str("DISTINCT ");
            }
            if node.extract_clause(RqlKind::First).is_some() {
                prefix.push_str("TOP 1 ");
            }
        }
        prefix
    }

    // ==================== joins ====================

    /// Render the mapping's declared joins, in declaration order, into
    /// `text`; literal references bind parameters into `sql`.
    fn add_join_conditions(
        &self,
        mapping: &EntityMapping,
        text: &mut String,
        sql: &mut Sql,
    ) -> RepoResult<()> {
        for join in &mapping.joins {
            let schema = join.schema.unwrap_or("");
            text.push(' ');
            text.push_str(join.kind.keyword());
            text.push(' ');
            text.push_str(&quote_table(schema, join.table)?);
            text.push_str(" ON ");

            let mut first = true;
            for condition in &join.conditions {
                match condition {
                    JoinCondition::BeginGroup => {
                        text.push('(');
                        first = true;
                    }
                    JoinCondition::EndGroup => {
                        text.push(')');
                    }
                    JoinCondition::Predicate {
                        combinator,
                        source_field,
                        op,
                        reference,
                    } => {
                        if !first {
                            text.push(' ');
                            text.push_str(combinator.keyword());
                            text.push(' ');
                        }
                        first = false;
                        text.push_str(&quote_path(schema, join.table, source_field)?);
                        text.push(' ');
                        text.push_str(op.sql());
                        text.push(' ');
                        match reference {
                            JoinRef::Field { schema, table, field } => {
                                let (s, t) = match table {
                                    None => (mapping.schema, mapping.table),
                                    Some(t) => (schema.unwrap_or(""), *t),
                                };
                                text.push_str(&quote_path(s, t, field)?);
                            }
                            JoinRef::Literal { field, value } => {
                                if value.eq_ignore_ascii_case("null") {
                                    text.push_str("NULL");
                                } else {
                                    let fm = self.resolve_field(mapping, field)?;
                                    let name = self.bind_field(
                                        sql,
                                        fm,
                                        &SqlValue::String((*value).to_string()),
                                    )?;
                                    text.push_str(&name);
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Key predicates in the SELECT shape: each `(path = @Pn)` individually
    /// parenthesized and AND-joined.
    fn key_predicates(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        sql: &mut Sql,
    ) -> RepoResult<String> {
        let mut clause = String::new();
        for (name, value) in keys {
            let field = self.resolve_key(mapping, name)?;
            let path = self.field_path(mapping, field)?;
            let param = self.bind_field(sql, field, value)?;
            if !clause.is_empty() {
                clause.push_str(" AND ");
            }
            clause.push_str(&format!("({path} = {param})"));
        }
        Ok(clause)
    }

    /// ` WHERE ...` combining key predicates and a compiled RQL clause; the
    /// RQL clause is parenthesized when keys are also present. Empty when
    /// both are.
    fn where_section(keys_clause: &str, where_clause: &str) -> String {
        match (keys_clause.is_empty(), where_clause.is_empty()) {
            (true, true) => String::new(),
            (false, true) => format!(" WHERE {keys_clause}"),
            (true, false) => format!(" WHERE {where_clause}"),
            (false, false) => format!(" WHERE {keys_clause} AND ({where_clause})"),
        }
    }

    // ==================== statement builders ====================

    /// INSERT for one item. Non-foreign, non-identity fields become the
    /// column list; when the mapping declares an identity field the statement
    /// asks the database to return the generated key and the field's mapping
    /// is handed back so the caller can assign it.
    pub fn build_insert<T: Entity>(
        &self,
        item: &T,
    ) -> RepoResult<(Sql, Option<&'static FieldMapping>)> {
        let mapping = T::mapping();
        self.check_mapping(mapping)?;

        let mut sql = Sql::empty();
        let mut columns = String::new();
        let mut values = String::new();
        for field in &mapping.fields {
            if field.identity || mapping.is_foreign(field) {
                continue;
            }
            if !columns.is_empty() {
                columns.push(',');
                values.push(',');
            }
            columns.push_str(&format!("[{}]", field.column));
            values.push_str(&self.bind_field(&mut sql, field, &item.get(field.field))?);
        }
        if columns.is_empty() {
            return Err(RqlError::bad_request("no insertable fields"));
        }

        let identity = mapping.identity_field();
        let mut text = format!(
            "INSERT INTO {} ({columns})",
            quote_table(mapping.schema, mapping.table)?
        );
        if let Some(identity) = identity {
            text.push_str(&format!(" OUTPUT inserted.[{}]", identity.column));
        }
        text.push_str(&format!(" VALUES ({values})"));
        sql.push(&text);
        Ok((sql, identity))
    }

    /// UPDATE keyed by the item's own primary-key values. The WHERE clause is
    /// compiled first, so key parameters take the low positions.
    pub fn build_update<T: Entity>(&self, item: &T) -> RepoResult<Sql> {
        let mapping = T::mapping();
        self.check_mapping(mapping)?;

        let mut sql = Sql::empty();
        let mut where_clause = String::new();
        for field in mapping.primary_keys() {
            if mapping.is_foreign(field) {
                continue;
            }
            let path = self.field_path(mapping, field)?;
            let name = self.bind_field(&mut sql, field, &item.get(field.field))?;
            if !where_clause.is_empty() {
                where_clause.push_str(" AND ");
            }
            where_clause.push_str(&format!("{path} = {name}"));
        }
        if where_clause.is_empty() {
            return Err(RqlError::invalid_operation(format!(
                "{} has no primary key fields to key an update",
                mapping.table
            )));
        }

        let mut set_clause = String::new();
        for field in &mapping.fields {
            if field.primary_key || mapping.is_foreign(field) {
                continue;
            }
            let name = self.bind_field(&mut sql, field, &item.get(field.field))?;
            if !set_clause.is_empty() {
                set_clause.push_str(", ");
            }
            set_clause.push_str(&format!("[{}] = {name}", field.column));
        }
        if set_clause.is_empty() {
            return Err(RqlError::bad_request("no updatable fields"));
        }

        let text = format!(
            "UPDATE {} SET {set_clause} WHERE {where_clause}",
            quote_table(mapping.schema, mapping.table)?
        );
        sql.push(&text);
        Ok(sql)
    }

    /// DELETE keyed by the supplied key/value pairs. An empty key set is
    /// rejected; deleting every row is the separate, deliberately named
    /// [`Emitter::build_delete_all`].
    pub fn build_delete(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;
        if keys.is_empty() {
            return Err(RqlError::bad_request(
                "delete requires at least one key; use delete_all to clear the table",
            ));
        }

        let mut sql = Sql::empty();
        let mut where_clause = String::new();
        for (name, value) in keys {
            let field = self.resolve_key(mapping, name)?;
            let path = self.field_path(mapping, field)?;
            let param = self.bind_field(&mut sql, field, value)?;
            if !where_clause.is_empty() {
                where_clause.push_str(" AND ");
            }
            where_clause.push_str(&format!("{path} = {param}"));
        }

        let text = format!(
            "DELETE FROM {} WHERE {where_clause}",
            quote_table(mapping.schema, mapping.table)?
        );
        sql.push(&text);
        Ok(sql)
    }

    /// DELETE with no WHERE clause: removes every row of the table.
    pub fn build_delete_all(&self, mapping: &EntityMapping) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;
        let mut sql = Sql::empty();
        let text = format!("DELETE FROM {}", quote_table(mapping.schema, mapping.table)?);
        sql.push(&text);
        Ok(sql)
    }

    /// UPDATE applying a list of patch operations, keyed by the supplied
    /// keys. Ops naming a primary-key field are silently skipped.
    pub fn build_patch(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        ops: &[PatchOp],
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;
        if keys.is_empty() {
            return Err(RqlError::bad_request("patch requires at least one key"));
        }

        let mut sql = Sql::empty();
        let mut where_clause = String::new();
        for (name, value) in keys {
            let field = self.resolve_key(mapping, name)?;
            let path = self.field_path(mapping, field)?;
            let param = self.bind_field(&mut sql, field, value)?;
            if !where_clause.is_empty() {
                where_clause.push_str(" AND ");
            }
            where_clause.push_str(&format!("{path} = {param}"));
        }

        let mut set_clause = String::new();
        for op in ops {
            let field = mapping.find_field(op.field()).ok_or_else(|| {
                RqlError::bad_request(format!(
                    "patch field {} is not a member of {}",
                    op.field(),
                    mapping.table
                ))
            })?;
            if field.primary_key {
                continue;
            }
            if mapping.is_foreign(field) {
                return Err(RqlError::bad_request(format!(
                    "patch field {} is not a member of {}",
                    op.field(),
                    mapping.table
                )));
            }
            if !set_clause.is_empty() {
                set_clause.push_str(", ");
            }
            match op {
                PatchOp::Replace { value, .. } | PatchOp::Add { value, .. } => {
                    let name = self.bind_field(&mut sql, field, value)?;
                    set_clause.push_str(&format!("[{}] = {name}", field.column));
                }
                PatchOp::Remove { .. } => {
                    set_clause.push_str(&format!("[{}] = NULL", field.column));
                }
            }
        }
        if set_clause.is_empty() {
            return Err(RqlError::bad_request("no patchable fields"));
        }

        let text = format!(
            "UPDATE {} SET {set_clause} WHERE {where_clause}",
            quote_table(mapping.schema, mapping.table)?
        );
        sql.push(&text);
        Ok(sql)
    }

    /// SELECT of only the primary-key columns, keyed by the supplied pairs.
    /// Used for existence and reference checks.
    pub fn build_reference_query(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;
        if keys.is_empty() {
            return Err(RqlError::bad_request("reference query requires at least one key"));
        }

        let mut columns = String::new();
        for field in mapping.primary_keys() {
            if !columns.is_empty() {
                columns.push_str(", ");
            }
            columns.push_str(&self.field_path(mapping, field)?);
        }
        if columns.is_empty() {
            return Err(RqlError::schema(format!(
                "{} has no primary key fields",
                mapping.table
            )));
        }

        let mut sql = Sql::empty();
        let keys_clause = self.key_predicates(mapping, keys, &mut sql)?;
        let text = format!(
            "SELECT {columns} FROM {}{} WHERE {keys_clause}",
            quote_table(mapping.schema, mapping.table)?,
            self.table_hint()
        );
        sql.push(&text);
        Ok(sql)
    }

    /// SELECT of one logical row.
    ///
    /// The projection honors a SELECT allowlist (primary keys always
    /// included), DISTINCT, FIRST (`TOP 1`) and aggregates; when aggregate
    /// clauses are present only the first one found depth-first is emitted
    /// and any plain projection is replaced by it. Declared joins apply in
    /// declaration order; the WHERE clause is the conjunction of the
    /// caller-supplied keys and the compiled RQL predicate.
    pub fn build_single_query(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;

        let mut sql = Sql::empty();
        let where_clause = self.parse_where_clause(mapping, node, None, &mut sql)?;
        let order_by = self.parse_order_by_clause(mapping, node)?;

        let mut text = String::from("SELECT ");
        text.push_str(&Self::distinct_first_prefix(node));

        let aggregates = node.map(RqlNode::extract_aggregates).unwrap_or_default();
        if let Some(RqlNode::Aggregate { func, field }) = aggregates.first() {
            let fm = self.resolve_field(mapping, field)?;
            let path = self.field_path(mapping, fm)?;
            text.push_str(&format!("{}({path}) as [{}]", func.sql(), fm.field));
        } else {
            text.push_str(&self.projection(mapping, Self::select_allowlist(node))?);
        }

        text.push_str(" FROM ");
        text.push_str(&quote_table(mapping.schema, mapping.table)?);
        text.push_str(self.table_hint());
        self.add_join_conditions(mapping, &mut text, &mut sql)?;

        let keys_clause = self.key_predicates(mapping, keys, &mut sql)?;
        text.push_str(&Self::where_section(&keys_clause, &where_clause));

        if !order_by.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&order_by);
        }

        sql.push(&text);
        Ok(sql)
    }

    /// COUNT query for a collection: same joins and WHERE as the list query,
    /// projecting `COUNT(*) as [RecordCount]`.
    pub fn build_collection_count_query(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;

        let mut sql = Sql::empty();
        let where_clause = self.parse_where_clause(mapping, node, None, &mut sql)?;

        let mut text = String::from("SELECT ");
        text.push_str(&Self::distinct_first_prefix(node));
        text.push_str("COUNT(*) as [RecordCount] FROM ");
        text.push_str(&quote_table(mapping.schema, mapping.table)?);
        self.add_join_conditions(mapping, &mut text, &mut sql)?;

        let keys_clause = self.key_predicates(mapping, keys, &mut sql)?;
        text.push_str(&Self::where_section(&keys_clause, &where_clause));

        sql.push(&text);
        Ok(sql)
    }

    /// Collection list query, two strategies:
    ///
    /// - unpaged (`no_paging`, or the estimated total fits under the batch
    ///   limit with no explicit page filter): one plain SELECT;
    /// - paged: a `ROW_NUMBER()` windowed subquery aliased `[t0]`, ordered by
    ///   the declared sort or by the primary key(s) ascending, selecting only
    ///   rows whose row number falls inside the window. The window count is
    ///   clamped to the batch limit.
    pub fn build_collection_list_query(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
        total: u64,
        page: Option<(u64, u64)>,
        no_paging: bool,
    ) -> RepoResult<Sql> {
        self.check_mapping(mapping)?;

        if no_paging || (total < self.options.batch_limit && page.is_none()) {
            return self.build_unpaged_list(mapping, keys, node);
        }

        let mut sql = Sql::empty();
        let where_clause = self.parse_where_clause(mapping, node, None, &mut sql)?;
        let order_by = self.parse_order_by_clause(mapping, node)?;
        let allowlist = Self::select_allowlist(node);

        let mut text = String::from("SELECT ");
        text.push_str(&Self::distinct_first_prefix(node));

        let mut outer = String::new();
        for field in &mapping.fields {
            if !Self::included(field, allowlist) {
                continue;
            }
            if !outer.is_empty() {
                outer.push_str(", ");
            }
            outer.push_str(&format!("[t0].[{}]", Self::output_name(field)));
        }
        text.push_str(&outer);

        text.push_str(" FROM (SELECT ROW_NUMBER() OVER (ORDER BY ");
        if order_by.is_empty() {
            text.push_str(&self.primary_key_order(mapping)?);
        } else {
            text.push_str(&order_by);
        }
        text.push_str(") as [ROW_NUMBER], ");
        text.push_str(&self.projection(mapping, allowlist)?);
        text.push_str(" FROM ");
        text.push_str(&quote_table(mapping.schema, mapping.table)?);
        text.push_str(self.table_hint());
        self.add_join_conditions(mapping, &mut text, &mut sql)?;

        let keys_clause = self.key_predicates(mapping, keys, &mut sql)?;
        text.push_str(&Self::where_section(&keys_clause, &where_clause));

        let (start, count) = page.unwrap_or((1, total));
        let count = count.min(self.options.batch_limit);
        let end = (start + count).saturating_sub(1);
        text.push_str(&format!(
            ") as [t0] WHERE [t0].[ROW_NUMBER] BETWEEN {start} AND {end} ORDER BY [t0].[ROW_NUMBER]"
        ));

        sql.push(&text);
        Ok(sql)
    }

    fn build_unpaged_list(
        &self,
        mapping: &EntityMapping,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
    ) -> RepoResult<Sql> {
        let mut sql = Sql::empty();
        let where_clause = self.parse_where_clause(mapping, node, None, &mut sql)?;
        let order_by = self.parse_order_by_clause(mapping, node)?;

        let mut text = String::from("SELECT ");
        text.push_str(&Self::distinct_first_prefix(node));
        text.push_str(&self.projection(mapping, Self::select_allowlist(node))?);
        text.push_str(" FROM ");
        text.push_str(&quote_table(mapping.schema, mapping.table)?);
        text.push_str(self.table_hint());
        self.add_join_conditions(mapping, &mut text, &mut sql)?;

        let keys_clause = self.key_predicates(mapping, keys, &mut sql)?;
        text.push_str(&Self::where_section(&keys_clause, &where_clause));

        if !order_by.is_empty() {
            text.push_str(" ORDER BY ");
            text.push_str(&order_by);
        }

        sql.push(&text);
        Ok(sql)
    }

    /// Window ordering fallback when no sort was requested: the primary
    /// key(s), ascending.
    fn primary_key_order(&self, mapping: &EntityMapping) -> RepoResult<String> {
        let pks: Vec<&FieldMapping> = mapping.primary_keys().collect();
        match pks.len() {
            0 => Err(RqlError::invalid_operation(format!(
                "cannot page {} without a sort clause or a primary key",
                mapping.table
            ))),
            1 => Ok(format!("{} asc", self.field_path(mapping, pks[0])?)),
            _ => {
                let mut clause = String::new();
                for pk in pks {
                    if !clause.is_empty() {
                        clause.push_str(", ");
                    }
                    clause.push_str(&self.field_path(mapping, pk)?);
                }
                Ok(clause)
            }
        }
    }
}

fn is_null_literal(value: &SqlValue) -> bool {
    match value {
        SqlValue::Null => true,
        SqlValue::String(s) => s.eq_ignore_ascii_case("null"),
        _ => false,
    }
}
