//! Postgres implementation of the repository and transaction traits.
//!
//! Every repository handed out by a [`PgStore`] shares one transaction slot.
//! While a transaction is open all reads and writes go through it; otherwise
//! they run straight against the pool.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BaseRepository, BaseTransactionManager, Record};
use crate::common::Id;

/// Column layout of a record, used to build batched upserts.
pub trait PgRecord: Record + for<'r> FromRow<'r, PgRow> + Unpin {
    /// Column names in bind order. The first one must be `id`.
    const COLUMNS: &'static [&'static str];

    /// Bind every column of this row, in `COLUMNS` order.
    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// Connection pool plus the currently open transaction, if any.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    tx: Arc<Mutex<Option<Transaction<'static, Postgres>>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: Arc::new(Mutex::new(None)),
        }
    }

    pub fn repository<R: PgRecord>(&self) -> PgRepository<R> {
        PgRepository {
            store: self.clone(),
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl BaseTransactionManager for PgStore {
    async fn begin(&self) -> Result<()> {
        let mut slot = self.tx.lock().await;
        if slot.is_some() {
            bail!("a transaction is already open on this store");
        }
        *slot = Some(self.pool.begin().await.context("failed to begin transaction")?);
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => tx.commit().await.context("failed to commit transaction"),
            None => bail!("no open transaction to commit"),
        }
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.tx.lock().await.take();
        match tx {
            Some(tx) => tx.rollback().await.context("failed to roll back transaction"),
            None => bail!("no open transaction to roll back"),
        }
    }
}

/// Table access for one record type.
pub struct PgRepository<R> {
    store: PgStore,
    _record: PhantomData<fn() -> R>,
}

/// Bind parameters Postgres accepts in one statement.
const MAX_BIND_PARAMS: usize = 65_535;

/// Rows that fit in one multi-row `INSERT` of `columns` columns.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Upsert `records` on `conn`, split into as many statements as the bind
/// parameter limit needs.
async fn upsert_rows<R: PgRecord>(conn: &mut PgConnection, records: Vec<R>) -> Result<()> {
    let per_statement = rows_per_statement(R::COLUMNS.len());
    let mut records = records.into_iter().peekable();

    while records.peek().is_some() {
        let rows: Vec<R> = records.by_ref().take(per_statement).collect();
        let count = rows.len();

        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {} ({}) ",
            R::TABLE,
            R::COLUMNS.join(", ")
        ));
        builder.push_values(rows, |mut row, record| record.push_row(&mut row));
        builder.push(" ON CONFLICT (id) DO UPDATE SET ");
        builder.push(upsert_assignments(R::COLUMNS));

        builder
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("failed to upsert {} rows into {}", count, R::TABLE))?;
    }

    Ok(())
}

/// `SET col = EXCLUDED.col, ...` for every non-key column.
fn upsert_assignments(columns: &[&str]) -> String {
    columns
        .iter()
        .filter(|column| **column != "id")
        .map(|column| format!("{column} = EXCLUDED.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl<R: PgRecord> BaseRepository<R> for PgRepository<R> {
    async fn find_all_ids(&self) -> Result<Vec<Id<R>>> {
        let sql = format!("SELECT id FROM {} ORDER BY id", R::TABLE);
        let query = sqlx::query_scalar::<_, Id<R>>(&sql);

        let mut slot = self.store.tx.lock().await;
        let ids = match slot.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.store.pool).await,
        }
        .with_context(|| format!("failed to list ids in {}", R::TABLE))?;

        Ok(ids)
    }

    async fn find_all_by_id(&self, ids: &[Id<R>]) -> Result<Vec<R>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT * FROM {} WHERE id = ANY($1) ORDER BY id", R::TABLE);
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();
        let query = sqlx::query_as::<_, R>(&sql).bind(uuids);

        let mut slot = self.store.tx.lock().await;
        let rows = match slot.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.store.pool).await,
        }
        .with_context(|| format!("failed to fetch {} rows from {}", ids.len(), R::TABLE))?;

        Ok(rows)
    }

    async fn find_by_id(&self, id: Id<R>) -> Result<Option<R>> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", R::TABLE);
        let query = sqlx::query_as::<_, R>(&sql).bind(id);

        let mut slot = self.store.tx.lock().await;
        let row = match slot.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.store.pool).await,
        }
        .with_context(|| format!("failed to fetch {} {}", R::ENTITY, id))?;

        Ok(row)
    }

    async fn save_all_and_flush(&self, records: Vec<R>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        // Outside a transaction, the statements of one call still commit together.
        let mut slot = self.store.tx.lock().await;
        match slot.as_mut() {
            Some(tx) => upsert_rows(&mut **tx, records).await,
            None => {
                let mut tx = self
                    .store
                    .pool
                    .begin()
                    .await
                    .context("failed to begin transaction")?;
                upsert_rows(&mut *tx, records).await?;
                tx.commit().await.context("failed to commit transaction")
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        let query = sqlx::query_scalar::<_, i64>(&sql);

        let mut slot = self.store.tx.lock().await;
        let count = match slot.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await,
            None => query.fetch_one(&self.store.pool).await,
        }
        .with_context(|| format!("failed to count {}", R::TABLE))?;

        Ok(count)
    }
}
