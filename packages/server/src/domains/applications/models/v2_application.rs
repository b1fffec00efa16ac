use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{Postgres, query_builder::Separated};

use crate::common::{V2ApplicationId, V2UserId};
use crate::kernel::{PgRecord, Record};

/// Application from the parallel v2 service (`v2_applications`).
#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq)]
pub struct V2Application {
    pub id: V2ApplicationId,
    pub crn: String,
    pub noms_number: Option<String>,
    pub created_by_user_id: V2UserId,

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
}

impl Record for V2Application {
    const TABLE: &'static str = "v2_applications";
    const ENTITY: &'static str = "v2 application";

    fn id(&self) -> V2ApplicationId {
        self.id
    }
}

impl PgRecord for V2Application {
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "crn",
        "noms_number",
        "created_by_user_id",
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
    ];

    fn push_row<'args>(self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
        row.push_bind(self.id)
            .push_bind(self.crn)
            .push_bind(self.noms_number)
            .push_bind(self.created_by_user_id)
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
            .push_bind(self.bail_hearing_date);
    }
}
