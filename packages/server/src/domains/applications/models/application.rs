use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, query_builder::Separated};

use crate::common::{ApplicationId, NomisUserId, UnifiedUserId};
use crate::kernel::{PgRecord, Record};

/// Whether the child collections of an application (status updates, notes,
/// assessment, assignments) live alongside it in the unified tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_relations", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RelationsAvailability {
    /// Child rows are in the unified tables (every v1 application).
    Available,
    /// Migrated from the v2 service before its child tables were. An empty
    /// notes list on such an application does not mean it has no notes.
    NotYetMigrated,
}

/// Application in the unified table (`applications`).
///
/// v1 applications already live here and reference their creator through the
/// legacy Nomis user table; the migration backfills `created_by_unified_user_id`.
/// v2 applications are copied in with the same id they had in `v2_applications`.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct Application {
    pub id: ApplicationId,
    pub crn: String,
    pub noms_number: Option<String>,

    /// Kept for code that still joins through `nomis_users`.
    pub created_by_legacy_user_id: NomisUserId,
    pub created_by_unified_user_id: Option<UnifiedUserId>,

    pub data: Option<serde_json::Value>,
    pub document: Option<serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub abandoned_at: Option<DateTime<Utc>>,

    pub referring_prison_code: Option<String>,
    pub preferred_areas: Option<String>,
    pub hdc_eligibility_date: Option<NaiveDate>,
    pub conditional_release_date: Option<NaiveDate>,
    pub telephone_number: Option<String>,
    pub application_origin: String,
    pub bail_hearing_date: Option<NaiveDate>,

    pub relations: RelationsAvailability,
}

impl Record for Application {
    const TABLE: &'static str = "applications";
    const ENTITY: &'static str = "application";

    fn id(&self) -> ApplicationId {
        self.id
    }
}

impl PgRecord for Application {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "crn",
        "noms_number",
        "created_by_legacy_user_id",
        "created_by_unified_user_id",
        "data",
        "document",
        "created_at",
        "submitted_at",
        "abandoned_at",
        "referring_prison_code",
        "preferred_areas",
        "hdc_eligibility_date",
        "conditional_release_date",
        "telephone_number",
        "application_origin",
        "bail_hearing_date",
        "relations",
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.crn)
            .push_bind(self.noms_number)
            .push_bind(self.created_by_legacy_user_id)
            .push_bind(self.created_by_unified_user_id)
            .push_bind(self.data)
            .push_bind(self.document)
            .push_bind(self.created_at)
            .push_bind(self.submitted_at)
            .push_bind(self.abandoned_at)
            .push_bind(self.referring_prison_code)
            .push_bind(self.preferred_areas)
            .push_bind(self.hdc_eligibility_date)
            .push_bind(self.conditional_release_date)
            .push_bind(self.telephone_number)
            .push_bind(self.application_origin)
            .push_bind(self.bail_hearing_date)
            .push_bind(self.relations);
    }
}
