// TestDependencies - in-memory storage for testing
//
// Implements the repository and transaction traits over plain maps so the
// whole migration can run in unit and integration tests without a database.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BaseRepository, BaseTransactionManager, MigrationDeps, Record};
use crate::common::Id;
use crate::domains::applications::models::{Application, V2Application};
use crate::domains::users::models::{ExternalUser, NomisUser, UnifiedUser, V2User};

// =============================================================================
// In-memory table
// =============================================================================

/// One table. Rows are kept ordered by id, like `find_all_ids` on Postgres.
pub struct InMemoryTable<R: Record> {
    rows: Mutex<BTreeMap<Id<R>, R>>,
    snapshot: Mutex<Option<BTreeMap<Id<R>, R>>>,
    save_calls: AtomicUsize,
    fail_on_save_call: Mutex<Option<usize>>,
}

impl<R: Record> InMemoryTable<R> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(BTreeMap::new()),
            snapshot: Mutex::new(None),
            save_calls: AtomicUsize::new(0),
            fail_on_save_call: Mutex::new(None),
        }
    }

    /// Seed rows directly, bypassing save call counting.
    pub fn insert(&self, records: impl IntoIterator<Item = R>) {
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.insert(record.id(), record);
        }
    }

    pub fn get(&self, id: Id<R>) -> Option<R> {
        self.rows.lock().unwrap().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<R> {
        self.rows.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `save_all_and_flush` calls so far, failed ones included.
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Make the nth `save_all_and_flush` call from now (1-based) fail.
    pub fn fail_on_save_call(&self, nth: usize) {
        let target = self.save_calls() + nth;
        *self.fail_on_save_call.lock().unwrap() = Some(target);
    }
}

impl<R: Record> Default for InMemoryTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: Record> BaseRepository<R> for InMemoryTable<R> {
    async fn find_all_ids(&self) -> Result<Vec<Id<R>>> {
        Ok(self.rows.lock().unwrap().keys().copied().collect())
    }

    async fn find_all_by_id(&self, ids: &[Id<R>]) -> Result<Vec<R>> {
        let rows = self.rows.lock().unwrap();
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn find_by_id(&self, id: Id<R>) -> Result<Option<R>> {
        Ok(self.get(id))
    }

    async fn save_all_and_flush(&self, records: Vec<R>) -> Result<()> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_on_save_call.lock().unwrap() == Some(call) {
            bail!("simulated save failure on {} (call {})", R::TABLE, call);
        }

        self.insert(records);
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.len() as i64)
    }
}

/// Table state that can be captured and restored around a transaction.
trait Snapshot: Send + Sync {
    fn take_snapshot(&self);
    fn restore_snapshot(&self);
    fn discard_snapshot(&self);
}

impl<R: Record> Snapshot for InMemoryTable<R> {
    fn take_snapshot(&self) {
        let rows = self.rows.lock().unwrap().clone();
        *self.snapshot.lock().unwrap() = Some(rows);
    }

    fn restore_snapshot(&self) {
        if let Some(rows) = self.snapshot.lock().unwrap().take() {
            *self.rows.lock().unwrap() = rows;
        }
    }

    fn discard_snapshot(&self) {
        self.snapshot.lock().unwrap().take();
    }
}

// =============================================================================
// In-memory store
// =============================================================================

/// Every table the migration touches, plus snapshot-based transactions.
pub struct InMemoryStore {
    pub nomis_users: Arc<InMemoryTable<NomisUser>>,
    pub external_users: Arc<InMemoryTable<ExternalUser>>,
    pub v2_users: Arc<InMemoryTable<V2User>>,
    pub unified_users: Arc<InMemoryTable<UnifiedUser>>,
    pub applications: Arc<InMemoryTable<Application>>,
    pub v2_applications: Arc<InMemoryTable<V2Application>>,
    in_transaction: AtomicBool,
    transactions_begun: AtomicUsize,
    transactions_rolled_back: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nomis_users: Arc::new(InMemoryTable::new()),
            external_users: Arc::new(InMemoryTable::new()),
            v2_users: Arc::new(InMemoryTable::new()),
            unified_users: Arc::new(InMemoryTable::new()),
            applications: Arc::new(InMemoryTable::new()),
            v2_applications: Arc::new(InMemoryTable::new()),
            in_transaction: AtomicBool::new(false),
            transactions_begun: AtomicUsize::new(0),
            transactions_rolled_back: AtomicUsize::new(0),
        })
    }

    /// Repositories and transaction manager backed by this store.
    pub fn deps(self: &Arc<Self>) -> MigrationDeps {
        MigrationDeps {
            nomis_users: self.nomis_users.clone(),
            external_users: self.external_users.clone(),
            v2_users: self.v2_users.clone(),
            unified_users: self.unified_users.clone(),
            applications: self.applications.clone(),
            v2_applications: self.v2_applications.clone(),
            transactions: self.clone(),
        }
    }

    pub fn transactions_begun(&self) -> usize {
        self.transactions_begun.load(Ordering::SeqCst)
    }

    pub fn transactions_rolled_back(&self) -> usize {
        self.transactions_rolled_back.load(Ordering::SeqCst)
    }

    fn tables(&self) -> [&dyn Snapshot; 6] {
        [
            self.nomis_users.as_ref(),
            self.external_users.as_ref(),
            self.v2_users.as_ref(),
            self.unified_users.as_ref(),
            self.applications.as_ref(),
            self.v2_applications.as_ref(),
        ]
    }
}

#[async_trait]
impl BaseTransactionManager for InMemoryStore {
    async fn begin(&self) -> Result<()> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            bail!("a transaction is already open on this store");
        }
        self.transactions_begun.fetch_add(1, Ordering::SeqCst);
        for table in self.tables() {
            table.take_snapshot();
        }
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            bail!("no open transaction to commit");
        }
        for table in self.tables() {
            table.discard_snapshot();
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            bail!("no open transaction to roll back");
        }
        self.transactions_rolled_back.fetch_add(1, Ordering::SeqCst);
        for table in self.tables() {
            table.restore_snapshot();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn external_user(username: &str) -> ExternalUser {
        ExternalUser {
            id: Id::new(),
            username: username.to_string(),
            name: "Test External".to_string(),
            email: format!("{username}@example.org"),
            origin: "NACRO".to_string(),
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let table = InMemoryTable::<ExternalUser>::new();
        let user = external_user("first");

        table.save_all_and_flush(vec![user.clone()]).await.unwrap();
        let mut renamed = user.clone();
        renamed.name = "Renamed".to_string();
        table.save_all_and_flush(vec![renamed]).await.unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(user.id).unwrap().name, "Renamed");
    }

    #[tokio::test]
    async fn test_rollback_restores_every_table() {
        let store = InMemoryStore::new();
        store.external_users.insert([external_user("kept")]);

        store.begin().await.unwrap();
        store
            .external_users
            .save_all_and_flush(vec![external_user("discarded")])
            .await
            .unwrap();
        assert_eq!(store.external_users.len(), 2);
        store.rollback().await.unwrap();

        assert_eq!(store.external_users.len(), 1);
        assert_eq!(store.transactions_rolled_back(), 1);
    }

    #[tokio::test]
    async fn test_nested_begin_is_rejected() {
        let store = InMemoryStore::new();
        store.begin().await.unwrap();
        assert!(store.begin().await.is_err());
        store.commit().await.unwrap();
        assert!(store.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_injected_save_failure_hits_only_the_nth_call() {
        let table = InMemoryTable::<ExternalUser>::new();
        table.fail_on_save_call(2);

        assert!(table.save_all_and_flush(vec![external_user("a")]).await.is_ok());
        assert!(table.save_all_and_flush(vec![external_user("b")]).await.is_err());
        assert!(table.save_all_and_flush(vec![external_user("c")]).await.is_ok());
        assert_eq!(table.len(), 2);
    }
}
