//! The repository façade: one typed entry point per operation, each racing
//! the generated statement against the configured per-operation timeout.

use std::future::Future;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::emitter::{Emitter, EmitterOptions, PatchOp};
use crate::entity::Entity;
use crate::error::{RepoResult, RqlError};
use crate::executor::Executor;
use crate::pager::{compute_links, page_window, RqlCollection, Window};
use crate::row::{read_column, read_entity, read_record_count};
use crate::rql::RqlNode;
use crate::value::SqlValue;

/// Explicit repository configuration; nothing is looked up ambiently.
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    /// Ceiling on rows per collection page, and the page size links use.
    pub batch_limit: u64,
    /// Per-operation deadline; an elapsed timer abandons the operation.
    pub timeout: Duration,
    /// Base URL collection links are built under.
    pub root_url: Url,
    /// Emit `WITH(NOLOCK)` on SELECT sources.
    pub read_uncommitted: bool,
    /// Force every collection onto the single unpaged strategy.
    pub no_paging: bool,
}

impl RepositoryOptions {
    pub fn new(root_url: Url) -> Self {
        Self {
            batch_limit: 100,
            timeout: Duration::from_secs(30),
            root_url,
            read_uncommitted: true,
            no_paging: false,
        }
    }
}

/// Typed repository over one [`Executor`].
pub struct Repository<E> {
    executor: E,
    emitter: Emitter,
    options: RepositoryOptions,
}

impl<E: Executor> Repository<E> {
    pub fn new(executor: E, options: RepositoryOptions) -> Self {
        let emitter = Emitter::new(EmitterOptions {
            batch_limit: options.batch_limit,
            read_uncommitted: options.read_uncommitted,
        });
        Self {
            executor,
            emitter,
            options,
        }
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Race a future against the configured deadline. Losing the race drops
    /// the future, which abandons the statement at its next await point.
    async fn timed<T>(&self, fut: impl Future<Output = RepoResult<T>>) -> RepoResult<T> {
        match tokio::time::timeout(self.options.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.options.timeout, "operation timed out");
                Err(RqlError::Timeout(self.options.timeout))
            }
        }
    }

    /// Insert one item. When the mapping declares an identity field the
    /// database-generated key is read back into the returned item.
    pub async fn add<T: Entity>(&self, item: T) -> RepoResult<T> {
        let (sql, identity) = self.emitter.build_insert(&item)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "add");
        self.timed(async {
            let mut item = item;
            match identity {
                Some(identity) => {
                    let mut rows = self.executor.query(&sql).await?;
                    if let Some(row) = rows.next().await.transpose()? {
                        if let Some(raw) =
                            row.value(identity.column).or_else(|| row.value(identity.field))
                        {
                            let value = read_column(identity, raw)?;
                            item.set(identity.field, value)?;
                        }
                    }
                }
                None => {
                    self.executor.execute(&sql).await?;
                }
            }
            Ok(item)
        })
        .await
    }

    /// Full update of one item, keyed by its own primary-key values.
    pub async fn update<T: Entity>(&self, item: T) -> RepoResult<T> {
        let sql = self.emitter.build_update(&item)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "update");
        let affected = self.timed(self.executor.execute(&sql)).await?;
        debug!(affected, "update complete");
        Ok(item)
    }

    /// Delete the rows matching the key set; at least one key is required.
    pub async fn delete<T: Entity>(&self, keys: &[(&str, SqlValue)]) -> RepoResult<u64> {
        let sql = self.emitter.build_delete(T::mapping(), keys)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "delete");
        self.timed(self.executor.execute(&sql)).await
    }

    /// Delete every row of the entity's table. Deliberately a separate
    /// operation from [`Repository::delete`] so an empty key set can never
    /// clear a table by accident.
    pub async fn delete_all<T: Entity>(&self) -> RepoResult<u64> {
        let sql = self.emitter.build_delete_all(T::mapping())?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "delete_all");
        self.timed(self.executor.execute(&sql)).await
    }

    /// Apply a list of patch operations to the rows matching the key set.
    pub async fn patch<T: Entity>(
        &self,
        keys: &[(&str, SqlValue)],
        ops: &[PatchOp],
    ) -> RepoResult<u64> {
        let sql = self.emitter.build_patch(T::mapping(), keys, ops)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "patch");
        self.timed(self.executor.execute(&sql)).await
    }

    /// True when at least one row matches the key set.
    pub async fn exists<T: Entity>(&self, keys: &[(&str, SqlValue)]) -> RepoResult<bool> {
        let sql = self.emitter.build_reference_query(T::mapping(), keys)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "exists");
        self.timed(async {
            let mut rows = self.executor.query(&sql).await?;
            Ok(rows.next().await.transpose()?.is_some())
        })
        .await
    }

    /// Fetch one logical row; `Ok(None)` when nothing matches.
    pub async fn get_single<T: Entity>(
        &self,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
    ) -> RepoResult<Option<T>> {
        if let Some(node) = node {
            let aggregates = node.extract_aggregates();
            if aggregates.len() > 1 {
                warn!(
                    discarded = aggregates.len() - 1,
                    "query carries multiple aggregate clauses; only the first is applied"
                );
            }
        }
        let sql = self.emitter.build_single_query(T::mapping(), keys, node)?;
        debug!(statement = sql.to_sql(), params = sql.params().len(), "get_single");
        self.timed(async {
            let mut rows = self.executor.query(&sql).await?;
            match rows.next().await.transpose()? {
                Some(row) => Ok(Some(read_entity::<T>(row.as_ref(), node)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Fetch one page of a collection: count, windowed list, and
    /// navigation links.
    ///
    /// A `limit()` window starting below 1 is normalized to the first page
    /// and the count query is skipped, the total backfilling from the rows
    /// actually read.
    pub async fn get_collection<T: Entity>(
        &self,
        keys: &[(&str, SqlValue)],
        node: Option<&RqlNode>,
    ) -> RepoResult<RqlCollection<T>> {
        let mapping = T::mapping();
        let batch = self.options.batch_limit;

        let mut page = page_window(node);
        let mut skip_count = false;
        if let Some(window) = page {
            if window.start < 1 {
                page = Some(Window::new(1, batch));
                skip_count = true;
            }
        }

        self.timed(async {
            let mut total = 0u64;
            if !skip_count {
                let count_sql = self.emitter.build_collection_count_query(mapping, keys, node)?;
                debug!(
                    statement = count_sql.to_sql(),
                    params = count_sql.params().len(),
                    "get_collection count"
                );
                let mut rows = self.executor.query(&count_sql).await?;
                if let Some(row) = rows.next().await.transpose()? {
                    total = read_record_count(row.as_ref())?;
                }
            }

            let list_sql = self.emitter.build_collection_list_query(
                mapping,
                keys,
                node,
                total,
                page.map(|w| (w.start, w.count)),
                self.options.no_paging,
            )?;
            debug!(
                statement = list_sql.to_sql(),
                params = list_sql.params().len(),
                "get_collection list"
            );

            let mut items = Vec::new();
            let mut rows = self.executor.query(&list_sql).await?;
            while let Some(row) = rows.next().await.transpose()? {
                items.push(read_entity::<T>(row.as_ref(), node)?);
            }

            if total == 0 {
                total = items.len() as u64;
            }
            // links step by the effective page size: the requested count
            // clamped to the batch limit, so following `next` walks the same
            // windows the list query serves
            let window = page.unwrap_or_else(|| Window::new(1, batch));
            let page_size = window.count.min(batch).max(1);
            let limit = if total <= page_size {
                None
            } else {
                Some(items.len() as u64)
            };

            let links =
                compute_links(&self.options.root_url, node, window.start, page_size, total);
            Ok(RqlCollection {
                count: total,
                limit,
                href: links.href,
                first: links.first,
                previous: links.previous,
                next: links.next,
                items,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RowStream;
    use crate::row::{BoxRow, ValueRow};
    use crate::sql::Sql;
    use crate::testutil::Widget;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted executor: hands out pre-arranged result sets in order and
    /// records every statement it sees.
    #[derive(Default)]
    struct FakeExecutor {
        result_sets: Mutex<VecDeque<Vec<ValueRow>>>,
        statements: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl FakeExecutor {
        fn scripted(result_sets: Vec<Vec<ValueRow>>) -> Self {
            Self {
                result_sets: Mutex::new(result_sets.into()),
                ..Self::default()
            }
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    impl Executor for FakeExecutor {
        async fn query(&self, sql: &Sql) -> RepoResult<RowStream> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.statements.lock().unwrap().push(sql.to_sql().to_string());
            let rows = self
                .result_sets
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            let items = rows
                .into_iter()
                .map(|row| Ok(Box::new(row) as BoxRow))
                .collect::<Vec<_>>();
            Ok(futures_util::stream::iter(items).boxed())
        }

        async fn execute(&self, sql: &Sql) -> RepoResult<u64> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.statements.lock().unwrap().push(sql.to_sql().to_string());
            Ok(1)
        }
    }

    fn options() -> RepositoryOptions {
        RepositoryOptions::new(Url::parse("https://api.example.com/widgets").unwrap())
    }

    fn widget_row(id: i32, name: &str) -> ValueRow {
        ValueRow::new()
            .with("Id", id)
            .with("Name", name)
            .with("Price", Decimal::new(100, 2))
    }

    #[tokio::test]
    async fn add_writes_the_generated_identity_back() {
        let executor =
            FakeExecutor::scripted(vec![vec![ValueRow::new().with("Id", 42_i32)]]);
        let repo = Repository::new(executor, options());
        let item = Widget {
            id: 0,
            name: "Bolt".into(),
            price: Decimal::new(150, 2),
        };
        let added = repo.add(item).await.unwrap();
        assert_eq!(added.id, 42);
        assert_eq!(
            repo.executor.statements(),
            vec![
                "INSERT INTO [dbo].[Widget] ([Name],[Price]) OUTPUT inserted.[Id] VALUES (@P0,@P1)"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn get_single_returns_none_for_an_empty_result() {
        let executor = FakeExecutor::scripted(vec![vec![]]);
        let repo = Repository::new(executor, options());
        let found: Option<Widget> = repo
            .get_single(&[("Id", SqlValue::I32(7))], None)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn get_single_materializes_the_first_row() {
        let executor = FakeExecutor::scripted(vec![vec![widget_row(7, "Bolt")]]);
        let repo = Repository::new(executor, options());
        let found: Option<Widget> = repo
            .get_single(&[("Id", SqlValue::I32(7))], None)
            .await
            .unwrap();
        assert_eq!(found.unwrap().name, "Bolt");
    }

    #[tokio::test]
    async fn exists_checks_for_at_least_one_row() {
        let executor = FakeExecutor::scripted(vec![vec![widget_row(7, "Bolt")], vec![]]);
        let repo = Repository::new(executor, options());
        assert!(repo.exists::<Widget>(&[("Id", SqlValue::I32(7))]).await.unwrap());
        assert!(!repo.exists::<Widget>(&[("Id", SqlValue::I32(8))]).await.unwrap());
    }

    #[tokio::test]
    async fn collection_counts_then_lists_then_links() {
        let page: Vec<ValueRow> = (101..=110).map(|i| widget_row(i, "Bolt")).collect();
        let executor = FakeExecutor::scripted(vec![
            vec![ValueRow::new().with("RecordCount", 250_i64)],
            page,
        ]);
        let repo = Repository::new(executor, options());
        let node = RqlNode::And(vec![
            RqlNode::eq("Name", "Bolt"),
            RqlNode::limit(101, 100),
        ]);
        let collection: RqlCollection<Widget> =
            repo.get_collection(&[], Some(&node)).await.unwrap();

        assert_eq!(collection.count, 250);
        assert_eq!(collection.limit, Some(10));
        assert_eq!(collection.items.len(), 10);
        assert_eq!(
            collection.href,
            "https://api.example.com/widgets/collection?and(eq(Name,Bolt),limit(101,100))"
        );
        assert_eq!(
            collection.previous.as_deref(),
            Some("https://api.example.com/widgets/collection?and(eq(Name,Bolt),limit(1,100))")
        );
        assert_eq!(
            collection.next.as_deref(),
            Some("https://api.example.com/widgets/collection?and(eq(Name,Bolt),limit(201,100))")
        );

        let statements = repo.executor.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("COUNT(*) as [RecordCount]"));
        assert!(statements[1].contains("BETWEEN 101 AND 200"));
    }

    #[tokio::test]
    async fn links_honor_a_window_smaller_than_the_batch_limit() {
        let page: Vec<ValueRow> = (1..=50).map(|i| widget_row(i, "Bolt")).collect();
        let executor = FakeExecutor::scripted(vec![
            vec![ValueRow::new().with("RecordCount", 250_i64)],
            page,
        ]);
        let repo = Repository::new(executor, options());
        let node = RqlNode::limit(1, 50);
        let collection: RqlCollection<Widget> =
            repo.get_collection(&[], Some(&node)).await.unwrap();

        // the next window picks up exactly where the served rows end
        assert_eq!(
            collection.href,
            "https://api.example.com/widgets/collection?limit(1,50)"
        );
        assert_eq!(
            collection.next.as_deref(),
            Some("https://api.example.com/widgets/collection?limit(51,50)")
        );
        assert!(collection.previous.is_none());
        assert_eq!(collection.limit, Some(50));

        let statements = repo.executor.statements();
        assert!(statements[1].contains("BETWEEN 1 AND 50"));
    }

    #[tokio::test]
    async fn oversized_windows_clamp_to_the_batch_limit_in_links() {
        let page: Vec<ValueRow> = (1..=100).map(|i| widget_row(i, "Bolt")).collect();
        let executor = FakeExecutor::scripted(vec![
            vec![ValueRow::new().with("RecordCount", 250_i64)],
            page,
        ]);
        let repo = Repository::new(executor, options());
        let node = RqlNode::limit(1, 1000);
        let collection: RqlCollection<Widget> =
            repo.get_collection(&[], Some(&node)).await.unwrap();

        assert_eq!(
            collection.next.as_deref(),
            Some("https://api.example.com/widgets/collection?limit(101,100)")
        );
        let statements = repo.executor.statements();
        assert!(statements[1].contains("BETWEEN 1 AND 100"));
    }

    #[tokio::test]
    async fn collection_window_below_one_skips_the_count_query() {
        let executor = FakeExecutor::scripted(vec![vec![widget_row(1, "Bolt")]]);
        let repo = Repository::new(executor, options());
        let node = RqlNode::limit(0, 50);
        let collection: RqlCollection<Widget> =
            repo.get_collection(&[], Some(&node)).await.unwrap();

        // total backfills from the rows actually read
        assert_eq!(collection.count, 1);
        let statements = repo.executor.statements();
        assert_eq!(statements.len(), 1);
        assert!(!statements[0].contains("RecordCount"));
    }

    #[tokio::test]
    async fn small_unpaged_collections_carry_no_limit_member() {
        let executor = FakeExecutor::scripted(vec![
            vec![ValueRow::new().with("RecordCount", 2_i64)],
            vec![widget_row(1, "Bolt"), widget_row(2, "Nut")],
        ]);
        let repo = Repository::new(executor, options());
        let collection: RqlCollection<Widget> = repo.get_collection(&[], None).await.unwrap();
        assert_eq!(collection.count, 2);
        assert_eq!(collection.limit, None);
        assert!(collection.next.is_none());
    }

    #[tokio::test]
    async fn a_slow_statement_times_out() {
        let executor = FakeExecutor {
            delay: Some(Duration::from_millis(200)),
            ..FakeExecutor::default()
        };
        let mut opts = options();
        opts.timeout = Duration::from_millis(10);
        let repo = Repository::new(executor, opts);
        let err = repo
            .get_single::<Widget>(&[("Id", SqlValue::I32(7))], None)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.status(), 500);
    }

    #[tokio::test]
    async fn delete_reports_the_affected_count() {
        let executor = FakeExecutor::default();
        let repo = Repository::new(executor, options());
        let affected = repo
            .delete::<Widget>(&[("Id", SqlValue::I32(7))])
            .await
            .unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            repo.executor.statements(),
            vec!["DELETE FROM [dbo].[Widget] WHERE [dbo].[Widget].[Id] = @P0".to_string()]
        );
    }

    #[tokio::test]
    async fn delete_all_is_an_explicit_operation() {
        let executor = FakeExecutor::default();
        let repo = Repository::new(executor, options());
        repo.delete_all::<Widget>().await.unwrap();
        assert_eq!(
            repo.executor.statements(),
            vec!["DELETE FROM [dbo].[Widget]".to_string()]
        );
    }

    #[tokio::test]
    async fn patch_runs_one_update_statement() {
        let executor = FakeExecutor::default();
        let repo = Repository::new(executor, options());
        let ops = vec![PatchOp::Replace {
            field: "Name".into(),
            value: SqlValue::String("Nut".into()),
        }];
        repo.patch::<Widget>(&[("Id", SqlValue::I32(7))], &ops)
            .await
            .unwrap();
        assert_eq!(
            repo.executor.statements(),
            vec!["UPDATE [dbo].[Widget] SET [Name] = @P1 WHERE [dbo].[Widget].[Id] = @P0".to_string()]
        );
    }
}
