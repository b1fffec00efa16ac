//! User steps: source users into `unified_users`, then legacy placeholders.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{info, warn};

use super::placeholder::{external_placeholder, is_placeholder_username, nomis_placeholder};
use super::reconcile::{unified_from_external, unified_from_nomis, unified_from_v2};
use super::{
    BatchProcessor, ChunkOutcome, DataMigration, Findings, MigrationContext, MigrationError,
    MigrationPhase, PhaseSummary, VerifyResult, VERIFY_CHUNK_SIZE,
};
use crate::common::{Id, V2UserId};
use crate::domains::users::models::{ExternalUser, NomisUser, UnifiedUser, V2User};
use crate::kernel::{BaseRepository, Record};

// =============================================================================
// Shared helpers
// =============================================================================

/// How a step turns its source rows into unified users.
struct UserSource<'a, S: Record> {
    repository: &'a dyn BaseRepository<S>,
    reconcile: fn(S) -> UnifiedUser,
    /// Rows this step leaves alone: placeholders written for v2 users.
    is_placeholder: fn(&S) -> bool,
}

impl<S: Record> Clone for UserSource<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Record> Copy for UserSource<'_, S> {}

fn legacy_nomis(ctx: &MigrationContext) -> UserSource<'_, NomisUser> {
    UserSource {
        repository: ctx.deps.nomis_users.as_ref(),
        reconcile: unified_from_nomis,
        is_placeholder: |user| is_placeholder_username(&user.nomis_username),
    }
}

fn legacy_external(ctx: &MigrationContext) -> UserSource<'_, ExternalUser> {
    UserSource {
        repository: ctx.deps.external_users.as_ref(),
        reconcile: unified_from_external,
        is_placeholder: |user| is_placeholder_username(&user.username),
    }
}

fn v2(ctx: &MigrationContext) -> UserSource<'_, V2User> {
    UserSource {
        repository: ctx.deps.v2_users.as_ref(),
        reconcile: unified_from_v2,
        is_placeholder: |_| false,
    }
}

/// Fetch one chunk of source users, reconcile and upsert into `unified_users`.
///
/// Ids whose source row is gone by the time the chunk is fetched are counted
/// as skipped, as are placeholder rows.
async fn migrate_user_chunk<S: Record>(
    ctx: &MigrationContext,
    source: UserSource<'_, S>,
    chunk: Vec<Id<S>>,
) -> Result<ChunkOutcome, MigrationError> {
    let rows = source.repository.find_all_by_id(&chunk).await?;
    let vanished = chunk.len() - rows.len();
    if vanished > 0 {
        warn!(table = S::TABLE, vanished, "Source rows disappeared since enumeration");
    }

    let users: Vec<UnifiedUser> = rows
        .into_iter()
        .filter(|row| !(source.is_placeholder)(row))
        .map(source.reconcile)
        .collect();
    let migrated = users.len();
    let skipped = chunk.len() - migrated;

    if !users.is_empty() {
        let ids: Vec<_> = users.iter().map(|user| user.id).collect();
        ctx.deps
            .unified_users
            .save_all_and_flush(users)
            .await
            .map_err(|e| MigrationError::chunk_save(UnifiedUser::TABLE, &ids, e))?;
    }

    Ok(ChunkOutcome::new(migrated, skipped))
}

async fn migrate_users<S: Record>(
    step: &'static str,
    migration: &dyn DataMigration,
    ctx: &MigrationContext,
    processor: &BatchProcessor,
    source: UserSource<'_, S>,
) -> Result<PhaseSummary, MigrationError> {
    let ids = source.repository.find_all_ids().await?;
    info!(step, table = S::TABLE, count = ids.len(), "Migrating users");

    processor
        .run(step, migration.failure_policy(), ids, |chunk| {
            migrate_user_chunk(ctx, source, chunk)
        })
        .await
}

/// Every source user has a unified row equal to its reconciled form.
async fn verify_users<S: Record>(
    ctx: &MigrationContext,
    source: UserSource<'_, S>,
) -> Result<VerifyResult, MigrationError> {
    let mut findings = Findings::default();
    let ids = source.repository.find_all_ids().await?;

    for chunk in ids.chunks(VERIFY_CHUNK_SIZE) {
        let rows: Vec<S> = source
            .repository
            .find_all_by_id(chunk)
            .await?
            .into_iter()
            .filter(|row| !(source.is_placeholder)(row))
            .collect();
        let unified_ids: Vec<_> = rows.iter().map(|row| row.id().rebrand()).collect();
        let stored = ctx.deps.unified_users.find_all_by_id(&unified_ids).await?;

        for row in rows {
            let expected = (source.reconcile)(row);
            match stored.iter().find(|user| user.id == expected.id) {
                None => findings.missing(1),
                Some(user) if *user != expected => findings.mismatch(format!(
                    "unified user {} differs from its {}",
                    user.id,
                    S::ENTITY
                )),
                Some(_) => {}
            }
        }
    }

    Ok(findings.into_result())
}

// =============================================================================
// Users phase
// =============================================================================

pub struct MigrateNomisUsers;

impl MigrateNomisUsers {
    pub const NAME: &'static str = "nomis_users";
}

#[async_trait]
impl DataMigration for MigrateNomisUsers {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Copy legacy Nomis users into unified_users"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::Users
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.nomis_users.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        migrate_users(Self::NAME, self, ctx, processor, legacy_nomis(ctx)).await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        verify_users(ctx, legacy_nomis(ctx)).await
    }
}

pub struct MigrateExternalUsers;

impl MigrateExternalUsers {
    pub const NAME: &'static str = "external_users";
}

#[async_trait]
impl DataMigration for MigrateExternalUsers {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Copy legacy external users into unified_users"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::Users
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.external_users.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        migrate_users(Self::NAME, self, ctx, processor, legacy_external(ctx)).await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        verify_users(ctx, legacy_external(ctx)).await
    }
}

pub struct MigrateV2Users;

impl MigrateV2Users {
    pub const NAME: &'static str = "v2_users";
}

#[async_trait]
impl DataMigration for MigrateV2Users {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Copy v2 users into unified_users"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::Users
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.v2_users.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        migrate_users(Self::NAME, self, ctx, processor, v2(ctx)).await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        verify_users(ctx, v2(ctx)).await
    }
}

// =============================================================================
// Placeholders phase
// =============================================================================

/// Dummy `nomis_users` and `external_users` rows for every v2 user.
///
/// Users that already have both rows are skipped. A v2 user without a
/// unified row means the users phase has not run, and stops the step.
pub struct SynthesizePlaceholderUsers;

impl SynthesizePlaceholderUsers {
    pub const NAME: &'static str = "placeholder_users";
}

async fn synthesize_placeholder_chunk(
    ctx: &MigrationContext,
    chunk: Vec<V2UserId>,
) -> Result<ChunkOutcome, MigrationError> {
    let nomis_ids: Vec<Id<NomisUser>> = chunk.iter().map(|id| id.rebrand()).collect();
    let external_ids: Vec<Id<ExternalUser>> = chunk.iter().map(|id| id.rebrand()).collect();

    let has_nomis: HashSet<_> = ctx
        .deps
        .nomis_users
        .find_all_by_id(&nomis_ids)
        .await?
        .into_iter()
        .map(|user| user.id.into_uuid())
        .collect();
    let has_external: HashSet<_> = ctx
        .deps
        .external_users
        .find_all_by_id(&external_ids)
        .await?
        .into_iter()
        .map(|user| user.id.into_uuid())
        .collect();

    let needed: Vec<Id<UnifiedUser>> = chunk
        .iter()
        .filter(|id| !has_nomis.contains(id.as_uuid()) || !has_external.contains(id.as_uuid()))
        .map(|id| id.rebrand())
        .collect();
    let skipped = chunk.len() - needed.len();
    if needed.is_empty() {
        return Ok(ChunkOutcome::new(0, skipped));
    }

    let users = ctx.deps.unified_users.find_all_by_id(&needed).await?;
    if let Some(missing) = needed.iter().find(|id| !users.iter().any(|user| user.id == **id)) {
        return Err(MigrationError::not_found(UnifiedUser::ENTITY, *missing));
    }

    let nomis_rows: Vec<NomisUser> = users
        .iter()
        .filter(|user| !has_nomis.contains(user.id.as_uuid()))
        .map(nomis_placeholder)
        .collect();
    let external_rows: Vec<ExternalUser> = users
        .iter()
        .filter(|user| !has_external.contains(user.id.as_uuid()))
        .map(external_placeholder)
        .collect();

    if !nomis_rows.is_empty() {
        let ids: Vec<_> = nomis_rows.iter().map(|row| row.id).collect();
        ctx.deps
            .nomis_users
            .save_all_and_flush(nomis_rows)
            .await
            .map_err(|e| MigrationError::chunk_save(NomisUser::TABLE, &ids, e))?;
    }
    if !external_rows.is_empty() {
        let ids: Vec<_> = external_rows.iter().map(|row| row.id).collect();
        ctx.deps
            .external_users
            .save_all_and_flush(external_rows)
            .await
            .map_err(|e| MigrationError::chunk_save(ExternalUser::TABLE, &ids, e))?;
    }

    Ok(ChunkOutcome::new(needed.len(), skipped))
}

#[async_trait]
impl DataMigration for SynthesizePlaceholderUsers {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Write placeholder legacy users for every v2 user"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::Placeholders
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.v2_users.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        let ids = ctx.deps.v2_users.find_all_ids().await?;
        info!(step = Self::NAME, count = ids.len(), "Synthesizing placeholder users");

        processor
            .run(Self::NAME, self.failure_policy(), ids, |chunk| {
                synthesize_placeholder_chunk(ctx, chunk)
            })
            .await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        let mut findings = Findings::default();
        let ids = ctx.deps.v2_users.find_all_ids().await?;

        for chunk in ids.chunks(VERIFY_CHUNK_SIZE) {
            let nomis_ids: Vec<Id<NomisUser>> = chunk.iter().map(|id| id.rebrand()).collect();
            let external_ids: Vec<Id<ExternalUser>> =
                chunk.iter().map(|id| id.rebrand()).collect();
            let nomis = ctx.deps.nomis_users.find_all_by_id(&nomis_ids).await?;
            let external = ctx.deps.external_users.find_all_by_id(&external_ids).await?;

            findings.missing(chunk.len() - nomis.len());
            findings.missing(chunk.len() - external.len());

            for row in nomis.iter().filter(|row| !is_placeholder_username(&row.nomis_username)) {
                findings.mismatch(format!("nomis user {} is not a placeholder", row.id));
            }
            for row in external.iter().filter(|row| !is_placeholder_username(&row.username)) {
                findings.mismatch(format!("external user {} is not a placeholder", row.id));
            }
        }

        Ok(findings.into_result())
    }
}
