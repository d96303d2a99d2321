//! Parameter-safe SQL statement builder.
//!
//! `Sql` accumulates statement text and bound parameters together so callers
//! never track placeholder indices by hand. Parameter names are positional
//! (`@P0`, `@P1`, ...) and are assigned at bind time, in computation order:
//! a fragment compiled early keeps its parameter names even when it lands
//! late in the final text, so the name in the text and the name bound at
//! execution always agree.
//!
//! # Example
//!
//! ```ignore
//! use rqlorm::sql::sql;
//!
//! let mut q = sql("SELECT * FROM [dbo].[Widget] WHERE ");
//! q.push_qualified("dbo", "Widget", "Name")?;
//! q.push(" = ");
//! q.push_bind(SqlType::NVarChar, Some(50), "Bolt".into());
//! assert_eq!(q.to_sql(), "SELECT * FROM [dbo].[Widget] WHERE [dbo].[Widget].[Name] = @P0");
//! ```

use crate::error::{RepoResult, RqlError};
use crate::value::{SqlParameter, SqlType, SqlValue};
use std::fmt::Write;

/// A SQL statement under construction: text plus its ordered parameter list.
#[derive(Debug, Default)]
pub struct Sql {
    text: String,
    params: Vec<SqlParameter>,
}

/// Start building a SQL statement.
pub fn sql(initial_sql: impl Into<String>) -> Sql {
    Sql::new(initial_sql)
}

fn valid_ident(segment: &str) -> bool {
    let mut chars = segment.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Render a bracket-quoted `[schema].[table].[column]` path, validating each
/// segment. An empty schema drops down to `[table].[column]`.
pub fn quote_path(schema: &str, table: &str, column: &str) -> RepoResult<String> {
    let mut out = String::new();
    if !schema.is_empty() {
        if !valid_ident(schema) {
            return Err(RqlError::bad_request(format!("invalid identifier '{schema}'")));
        }
        let _ = write!(&mut out, "[{schema}].");
    }
    if !valid_ident(table) || !valid_ident(column) {
        return Err(RqlError::bad_request(format!(
            "invalid identifier '{table}.{column}'"
        )));
    }
    let _ = write!(&mut out, "[{table}].[{column}]");
    Ok(out)
}

/// Render a bracket-quoted `[schema].[table]` name.
pub fn quote_table(schema: &str, table: &str) -> RepoResult<String> {
    if !valid_ident(table) {
        return Err(RqlError::bad_request(format!("invalid identifier '{table}'")));
    }
    if schema.is_empty() {
        return Ok(format!("[{table}]"));
    }
    if !valid_ident(schema) {
        return Err(RqlError::bad_request(format!("invalid identifier '{schema}'")));
    }
    Ok(format!("[{schema}].[{table}]"))
}

impl Sql {
    /// Create a new builder with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            text: initial_sql.into(),
            params: Vec::new(),
        }
    }

    /// Create an empty builder.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.text.push_str(sql);
        self
    }

    /// Append a single bracket-quoted identifier, validating the segment.
    pub fn push_ident(&mut self, ident: &str) -> RepoResult<&mut Self> {
        if !valid_ident(ident) {
            return Err(RqlError::bad_request(format!("invalid identifier '{ident}'")));
        }
        let _ = write!(&mut self.text, "[{ident}]");
        Ok(self)
    }

    /// Append a bracket-quoted `[schema].[table].[column]` path.
    pub fn push_qualified(
        &mut self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> RepoResult<&mut Self> {
        let path = quote_path(schema, table, column)?;
        self.text.push_str(&path);
        Ok(self)
    }

    /// Register a parameter and return its positional name without touching
    /// the text. Callers interpolate the name into a fragment assembled
    /// separately.
    pub fn bind(&mut self, ty: SqlType, size: Option<u32>, value: SqlValue) -> String {
        let name = format!("@P{}", self.params.len());
        self.params.push(SqlParameter {
            name: name.clone(),
            ty,
            size,
            value,
        });
        name
    }

    /// Register a parameter and append its placeholder to the text.
    pub fn push_bind(&mut self, ty: SqlType, size: Option<u32>, value: SqlValue) -> &mut Self {
        let name = self.bind(ty, size, value);
        self.text.push_str(&name);
        self
    }

    /// The statement text.
    pub fn to_sql(&self) -> &str {
        &self.text
    }

    /// The ordered parameter list.
    pub fn params(&self) -> &[SqlParameter] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<SqlParameter>) {
        (self.text, self.params)
    }

    /// Check that every registered parameter name occurs in the text.
    pub fn validate(&self) -> RepoResult<()> {
        for param in &self.params {
            if !self.contains_name(&param.name) {
                return Err(RqlError::invalid_operation(format!(
                    "parameter {} is bound but does not appear in the statement",
                    param.name
                )));
            }
        }
        Ok(())
    }

    // Substring search with a digit boundary so @P1 does not match @P10.
    fn contains_name(&self, name: &str) -> bool {
        let bytes = self.text.as_bytes();
        let mut from = 0;
        while let Some(pos) = self.text[from..].find(name) {
            let end = from + pos + name.len();
            if bytes.get(end).is_none_or(|b| !b.is_ascii_digit()) {
                return true;
            }
            from += pos + 1;
        }
        false
    }
}
