use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, query_builder::Separated};

use crate::common::NomisUserId;
use crate::kernel::{PgRecord, Record};

/// Legacy prison-staff user (`nomis_users`).
///
/// Still joined against by code paths that have not moved to `unified_users`.
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct NomisUser {
    pub id: NomisUserId,
    pub name: String,
    pub nomis_username: String,
    pub email: Option<String>,
    pub nomis_staff_id: i64,
    pub account_type: String,
    pub is_enabled: bool,
    pub is_active: bool,
    pub active_caseload_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for NomisUser {
    const TABLE: &'static str = "nomis_users";
    const ENTITY: &'static str = "nomis user";

    fn id(&self) -> NomisUserId {
        self.id
    }
}

impl PgRecord for NomisUser {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "nomis_username",
        "email",
        "nomis_staff_id",
        "account_type",
        "is_enabled",
        "is_active",
        "active_caseload_id",
        "created_at",
        "updated_at",
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.name)
            .push_bind(self.nomis_username)
            .push_bind(self.email)
            .push_bind(self.nomis_staff_id)
            .push_bind(self.account_type)
            .push_bind(self.is_enabled)
            .push_bind(self.is_active)
            .push_bind(self.active_caseload_id)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
