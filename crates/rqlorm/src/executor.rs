//! The execution seam between statement generation and a database driver.

use std::future::Future;
use std::pin::Pin;

use futures_core::Stream;

use crate::error::RepoResult;
use crate::row::BoxRow;
use crate::sql::Sql;

/// Stream of result rows pulled one at a time; dropping it abandons the
/// remaining rows.
pub type RowStream = Pin<Box<dyn Stream<Item = RepoResult<BoxRow>> + Send>>;

/// A connection capable of running generated statements.
///
/// Implementations translate [`Sql`] (text plus typed `@P<n>` parameters)
/// into a driver call. Driver-level failures surface as
/// [`RqlError::Connection`](crate::RqlError::Connection) when the session
/// could not be established and [`RqlError::Db`](crate::RqlError::Db)
/// otherwise.
pub trait Executor: Send + Sync {
    /// Run a statement and stream its result rows.
    fn query(&self, sql: &Sql) -> impl Future<Output = RepoResult<RowStream>> + Send;

    /// Run a statement that returns no rows, yielding the affected-row count.
    fn execute(&self, sql: &Sql) -> impl Future<Output = RepoResult<u64>> + Send;
}
