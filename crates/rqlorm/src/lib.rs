//! # rqlorm
//!
//! An RQL-to-SQL query compilation engine for a SQL Server-flavored dialect.
//!
//! ## Features
//!
//! - **Typed RQL trees**: queries are a tagged union ([`RqlNode`]), not strings
//! - **Static mapping tables**: entity types carry an [`EntityMapping`] built once
//! - **One emitter**: every statement family compiled from the same mapping + tree
//! - **Bind-time parameters**: `@P0, @P1, ...` named as values are bound, not rendered
//! - **Paged collections**: `ROW_NUMBER()` windows with `first`/`previous`/`next` links
//! - **Safe defaults**: DELETE requires keys; clearing a table is its own operation
//!
//! ## Usage
//!
//! ```ignore
//! use rqlorm::{Repository, RepositoryOptions, RqlNode};
//!
//! let repo = Repository::new(executor, RepositoryOptions::new(root_url));
//!
//! // POST /widgets
//! let widget = repo.add(widget).await?;
//!
//! // GET /widgets/collection?and(eq(Name,Bolt),limit(101,100))
//! let node = RqlNode::And(vec![
//!     RqlNode::eq("Name", "Bolt"),
//!     RqlNode::limit(101, 100),
//! ]);
//! let page = repo.get_collection::<Widget>(&[], Some(&node)).await?;
//! ```
//!
//! The [`Executor`] trait is the seam a database driver implements; the rest
//! of the engine is driver-agnostic and synchronous until execution.

pub mod emitter;
pub mod entity;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod pager;
pub mod repository;
pub mod row;
pub mod rql;
pub mod sql;
pub mod value;

pub use emitter::{Emitter, EmitterOptions, PatchOp};
pub use entity::Entity;
pub use error::{RepoResult, RqlError};
pub use executor::{Executor, RowStream};
pub use mapping::{
    EntityMapping, EnumEncoding, EnumMember, EnumSpec, FieldMapping, JoinCombinator,
    JoinCondition, JoinKind, JoinRef, JoinSpec, StringEncoding,
};
pub use pager::{compute_links, page_window, CollectionLinks, RqlCollection, Window};
pub use repository::{Repository, RepositoryOptions};
pub use row::{read_column, read_entity, read_record_count, BoxRow, Row, ValueRow};
pub use rql::{AggregateFn, CompareOp, RqlKind, RqlNode, SortKey};
pub use sql::{quote_path, quote_table, sql, Sql};
pub use value::{ColumnType, SqlParameter, SqlType, SqlValue};

#[cfg(test)]
pub(crate) mod testutil;
