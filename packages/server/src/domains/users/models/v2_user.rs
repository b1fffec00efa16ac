use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, query_builder::Separated};

use crate::common::V2UserId;
use crate::kernel::{PgRecord, Record};

/// Which identity provider a v2 user came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "v2_user_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum V2UserType {
    Nomis,
    Delius,
    External,
}

/// User from the parallel v2 application service (`v2_users`).
///
/// One row shape for all three origins; the origin-specific fields are
/// optional and only the group matching `user_type` is expected to be set.
/// The v2 service never recorded a Nomis account type or an external origin.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct V2User {
    pub id: V2UserId,
    pub name: String,
    pub username: String,
    pub email: Option<String>,
    pub user_type: V2UserType,

    // NOMIS
    pub nomis_staff_id: Option<i64>,
    pub active_nomis_caseload_id: Option<String>,

    // DELIUS
    pub delius_staff_code: Option<String>,
    pub delius_team_codes: Option<Vec<String>>,

    pub is_enabled: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for V2User {
    const TABLE: &'static str = "v2_users";
    const ENTITY: &'static str = "v2 user";

    fn id(&self) -> V2UserId {
        self.id
    }
}

impl PgRecord for V2User {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "username",
        "email",
        "user_type",
        "nomis_staff_id",
        "active_nomis_caseload_id",
        "delius_staff_code",
        "delius_team_codes",
        "is_enabled",
        "is_active",
        "created_at",
        "updated_at",
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.name)
            .push_bind(self.username)
            .push_bind(self.email)
            .push_bind(self.user_type)
            .push_bind(self.nomis_staff_id)
            .push_bind(self.active_nomis_caseload_id)
            .push_bind(self.delius_staff_code)
            .push_bind(self.delius_team_codes)
            .push_bind(self.is_enabled)
            .push_bind(self.is_active)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
