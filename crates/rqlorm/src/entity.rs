//! The entity contract consumed by the emitter and the materializer.

use crate::error::RepoResult;
use crate::mapping::EntityMapping;
use crate::value::SqlValue;

/// A type with a static field mapping and dynamic field access in terms of
/// [`SqlValue`].
///
/// Field names are the logical names of the mapping. Enum-typed fields
/// exchange the member *name* on both sides: `get` returns
/// `SqlValue::String(member_name)` and `set` receives the same, regardless of
/// whether the column stores a string tag or an integer code — the mapping's
/// `EnumSpec` owns the translation to and from the stored representation.
///
/// Implementations are hand-written or generated by the caller's own tooling;
/// a typical one is a match over the mapped field names.
pub trait Entity: Default + Send + Sync {
    /// The static mapping table for this type.
    fn mapping() -> &'static EntityMapping;

    /// Current value of a mapped field. Absent optional values and unmapped
    /// names yield `SqlValue::Null`.
    fn get(&self, field: &str) -> SqlValue;

    /// Assign a mapped field from a decoded row value. Fails when the value
    /// does not fit the field's representation.
    fn set(&mut self, field: &str, value: SqlValue) -> RepoResult<()>;
}
