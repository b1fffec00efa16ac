use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, query_builder::Separated};

use crate::common::UnifiedUserId;
use crate::kernel::{PgRecord, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserType {
    Nomis,
    Delius,
    External,
}

/// Consolidated user (`unified_users`).
///
/// `id` is always the id of the record the user was migrated from. Exactly one
/// origin field group (nomis, delius or external) is populated, matching
/// `user_type`; the others stay `None`.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct UnifiedUser {
    pub id: UnifiedUserId,
    pub name: String,
    pub email: Option<String>,
    pub username: String,
    pub user_type: UserType,

    pub nomis_staff_id: Option<i64>,
    pub nomis_account_type: Option<String>,
    pub active_nomis_caseload_id: Option<String>,

    pub delius_staff_code: Option<String>,
    pub delius_team_codes: Option<Vec<String>>,

    pub external_type: Option<String>,

    pub is_active: bool,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UnifiedUser {
    /// Whether the populated origin groups agree with `user_type`.
    pub fn has_consistent_origin_fields(&self) -> bool {
        let nomis = self.nomis_staff_id.is_some()
            || self.nomis_account_type.is_some()
            || self.active_nomis_caseload_id.is_some();
        let delius = self.delius_staff_code.is_some() || self.delius_team_codes.is_some();
        let external = self.external_type.is_some();

        match self.user_type {
            UserType::Nomis => !delius && !external,
            UserType::Delius => !nomis && !external,
            UserType::External => !nomis && !delius,
        }
    }
}

impl Record for UnifiedUser {
    const TABLE: &'static str = "unified_users";
    const ENTITY: &'static str = "unified user";

    fn id(&self) -> UnifiedUserId {
        self.id
    }
}

impl PgRecord for UnifiedUser {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "email",
        "username",
        "user_type",
        "nomis_staff_id",
        "nomis_account_type",
        "active_nomis_caseload_id",
        "delius_staff_code",
        "delius_team_codes",
        "external_type",
        "is_active",
        "is_enabled",
        "created_at",
        "updated_at",
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.name)
            .push_bind(self.email)
            .push_bind(self.username)
            .push_bind(self.user_type)
            .push_bind(self.nomis_staff_id)
            .push_bind(self.nomis_account_type)
            .push_bind(self.active_nomis_caseload_id)
            .push_bind(self.delius_staff_code)
            .push_bind(self.delius_team_codes)
            .push_bind(self.external_type)
            .push_bind(self.is_active)
            .push_bind(self.is_enabled)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
