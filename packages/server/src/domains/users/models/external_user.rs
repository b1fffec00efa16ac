use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, query_builder::Separated};

use crate::common::ExternalUserId;
use crate::kernel::{PgRecord, Record};

/// Legacy partner-organisation user (`external_users`).
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct ExternalUser {
    pub id: ExternalUserId,
    pub username: String,
    pub name: String,
    pub email: String,
    /// Partner organisation the account belongs to, e.g. "NACRO".
    pub origin: String,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Record for ExternalUser {
    const TABLE: &'static str = "external_users";
    const ENTITY: &'static str = "external user";

    fn id(&self) -> ExternalUserId {
        self.id
    }
}

impl PgRecord for ExternalUser {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "name",
        "email",
        "origin",
        "is_enabled",
        "created_at",
        "updated_at",
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.username)
            .push_bind(self.name)
            .push_bind(self.email)
            .push_bind(self.origin)
            .push_bind(self.is_enabled)
            .push_bind(self.created_at)
            .push_bind(self.updated_at);
    }
}
