//! Application steps: link v1 applications to their unified creator, then
//! copy v2 applications into `applications`.

use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::reconcile::{application_from_v2, link_unified_creator};
use super::{
    BatchProcessor, ChunkOutcome, DataMigration, Findings, MigrationContext, MigrationError,
    MigrationPhase, PhaseSummary, VerifyResult, VERIFY_CHUNK_SIZE,
};
use crate::common::{ApplicationId, UnifiedUserId, V2ApplicationId};
use crate::domains::applications::models::{Application, V2Application};
use crate::domains::users::models::UnifiedUser;
use crate::kernel::Record;

// =============================================================================
// v1 applications
// =============================================================================

/// Backfill `created_by_unified_user_id` on applications already in the
/// unified table.
///
/// The unified creator has the same id as the legacy Nomis creator.
/// Applications already pointing at it are skipped.
pub struct UpdateV1Applications;

impl UpdateV1Applications {
    pub const NAME: &'static str = "v1_applications";
}

fn expected_creator(application: &Application) -> UnifiedUserId {
    application.created_by_legacy_user_id.rebrand()
}

async fn link_creator_chunk(
    ctx: &MigrationContext,
    chunk: Vec<ApplicationId>,
) -> Result<ChunkOutcome, MigrationError> {
    let applications = ctx.deps.applications.find_all_by_id(&chunk).await?;
    let vanished = chunk.len() - applications.len();
    if vanished > 0 {
        warn!(vanished, "Applications disappeared since enumeration");
    }

    let mut creators: HashMap<UnifiedUserId, UnifiedUser> = HashMap::new();
    let mut updated = Vec::new();

    for application in applications {
        let creator_id = expected_creator(&application);
        if application.created_by_unified_user_id == Some(creator_id) {
            continue;
        }

        if !creators.contains_key(&creator_id) {
            let creator = ctx
                .deps
                .unified_users
                .find_by_id(creator_id)
                .await?
                .ok_or_else(|| MigrationError::not_found(UnifiedUser::ENTITY, creator_id))?;
            creators.insert(creator_id, creator);
        }

        if let Some(creator) = creators.get(&creator_id) {
            updated.push(link_unified_creator(application, creator));
        }
    }

    let migrated = updated.len();
    let skipped = chunk.len() - migrated;
    debug!(migrated, skipped, creators = creators.len(), "Linked application creators");

    if !updated.is_empty() {
        let ids: Vec<_> = updated.iter().map(|application| application.id).collect();
        ctx.deps
            .applications
            .save_all_and_flush(updated)
            .await
            .map_err(|e| MigrationError::chunk_save(Application::TABLE, &ids, e))?;
    }

    Ok(ChunkOutcome::new(migrated, skipped))
}

#[async_trait]
impl DataMigration for UpdateV1Applications {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Link existing applications to their unified creator"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::ApplicationUpdate
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.applications.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        let ids = ctx.deps.applications.find_all_ids().await?;
        info!(step = Self::NAME, count = ids.len(), "Linking application creators");

        processor
            .run(Self::NAME, self.failure_policy(), ids, |chunk| {
                link_creator_chunk(ctx, chunk)
            })
            .await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        let mut findings = Findings::default();
        let ids = ctx.deps.applications.find_all_ids().await?;

        for chunk in ids.chunks(VERIFY_CHUNK_SIZE) {
            for application in ctx.deps.applications.find_all_by_id(chunk).await? {
                match application.created_by_unified_user_id {
                    None => findings.missing(1),
                    Some(creator) if creator != expected_creator(&application) => {
                        findings.mismatch(format!(
                            "application {} is linked to {} but was created by {}",
                            application.id, creator, application.created_by_legacy_user_id
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        Ok(findings.into_result())
    }
}

// =============================================================================
// v2 applications
// =============================================================================

/// Copy every v2 application into `applications`, keeping its id.
///
/// The creator must already be in `unified_users`.
pub struct MigrateV2Applications;

impl MigrateV2Applications {
    pub const NAME: &'static str = "v2_applications";
}

async fn copy_v2_chunk(
    ctx: &MigrationContext,
    chunk: Vec<V2ApplicationId>,
) -> Result<ChunkOutcome, MigrationError> {
    let sources = ctx.deps.v2_applications.find_all_by_id(&chunk).await?;
    let vanished = chunk.len() - sources.len();
    if vanished > 0 {
        warn!(vanished, "v2 applications disappeared since enumeration");
    }

    let mut creator_ids: Vec<UnifiedUserId> = sources
        .iter()
        .map(|source| source.created_by_user_id.rebrand())
        .collect();
    creator_ids.sort();
    creator_ids.dedup();

    let creators: HashMap<UnifiedUserId, UnifiedUser> = ctx
        .deps
        .unified_users
        .find_all_by_id(&creator_ids)
        .await?
        .into_iter()
        .map(|user| (user.id, user))
        .collect();

    let mut applications = Vec::with_capacity(sources.len());
    for source in sources {
        let creator_id: UnifiedUserId = source.created_by_user_id.rebrand();
        let creator = creators
            .get(&creator_id)
            .ok_or_else(|| MigrationError::not_found(UnifiedUser::ENTITY, creator_id))?;
        applications.push(application_from_v2(source, creator));
    }

    let migrated = applications.len();
    if !applications.is_empty() {
        let ids: Vec<_> = applications.iter().map(|application| application.id).collect();
        ctx.deps
            .applications
            .save_all_and_flush(applications)
            .await
            .map_err(|e| MigrationError::chunk_save(Application::TABLE, &ids, e))?;
    }

    Ok(ChunkOutcome::new(migrated, vanished))
}

#[async_trait]
impl DataMigration for MigrateV2Applications {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn description(&self) -> &'static str {
        "Copy v2 applications into the unified application table"
    }

    fn phase(&self) -> MigrationPhase {
        MigrationPhase::ApplicationMigrate
    }

    async fn estimate(&self, ctx: &MigrationContext) -> Result<i64, MigrationError> {
        Ok(ctx.deps.v2_applications.count().await?)
    }

    async fn run(
        &self,
        ctx: &MigrationContext,
        processor: &BatchProcessor,
    ) -> Result<PhaseSummary, MigrationError> {
        let ids = ctx.deps.v2_applications.find_all_ids().await?;
        info!(step = Self::NAME, count = ids.len(), "Migrating v2 applications");

        processor
            .run(Self::NAME, self.failure_policy(), ids, |chunk| {
                copy_v2_chunk(ctx, chunk)
            })
            .await
    }

    async fn verify(&self, ctx: &MigrationContext) -> Result<VerifyResult, MigrationError> {
        let mut findings = Findings::default();
        let ids = ctx.deps.v2_applications.find_all_ids().await?;

        for chunk in ids.chunks(VERIFY_CHUNK_SIZE) {
            let sources: Vec<V2Application> = ctx.deps.v2_applications.find_all_by_id(chunk).await?;
            let target_ids: Vec<ApplicationId> = sources.iter().map(|s| s.id.rebrand()).collect();
            let migrated: HashMap<ApplicationId, Application> = ctx
                .deps
                .applications
                .find_all_by_id(&target_ids)
                .await?
                .into_iter()
                .map(|application| (application.id, application))
                .collect();

            for source in sources {
                let Some(application) = migrated.get(&source.id.rebrand()) else {
                    findings.missing(1);
                    continue;
                };
                let creator: UnifiedUserId = source.created_by_user_id.rebrand();
                if application.crn != source.crn {
                    findings.mismatch(format!("application {} has a different crn", source.id));
                } else if application.created_by_unified_user_id != Some(creator) {
                    findings.mismatch(format!(
                        "application {} is not linked to creator {}",
                        source.id, creator
                    ));
                }
            }
        }

        Ok(findings.into_result())
    }
}
