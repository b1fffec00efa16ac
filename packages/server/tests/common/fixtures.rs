//! Test fixtures for creating test data.
//!
//! Rows are built in memory and written through the repositories, so the
//! same data seeds both the in-memory store and Postgres. Timestamps are
//! whole seconds so they survive a Postgres round trip unchanged.

use anyhow::Result;
use case_migration::common::Id;
use case_migration::domains::applications::models::{
    Application, RelationsAvailability, V2Application,
};
use case_migration::domains::users::models::{ExternalUser, NomisUser, V2User, V2UserType};
use case_migration::kernel::MigrationDeps;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;

fn timestamp(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() + Duration::minutes(i as i64)
}

pub fn nomis_user(i: usize) -> NomisUser {
    NomisUser {
        id: Id::new(),
        name: format!("Nomis User {i}"),
        nomis_username: format!("NOMIS_USER_{i}"),
        email: (i % 4 != 0).then(|| format!("nomis{i}@justice.example")),
        nomis_staff_id: 10_000 + i as i64,
        account_type: if i % 5 == 0 { "ADMIN" } else { "GENERAL" }.to_string(),
        is_enabled: true,
        is_active: i % 7 != 0,
        active_caseload_id: (i % 3 != 0).then(|| format!("P{:02}", i % 40)),
        created_at: timestamp(i),
        updated_at: (i % 2 == 0).then(|| timestamp(i + 1_000)),
    }
}

pub fn external_user(i: usize) -> ExternalUser {
    ExternalUser {
        id: Id::new(),
        username: format!("external-{i}"),
        name: format!("External User {i}"),
        email: format!("external{i}@partner.example"),
        origin: if i % 2 == 0 { "NACRO" } else { "CRC" }.to_string(),
        is_enabled: i % 9 != 0,
        created_at: timestamp(i),
        updated_at: None,
    }
}

/// v2 users cycle through Nomis, Delius and external origins.
pub fn v2_user(i: usize) -> V2User {
    let user_type = match i % 3 {
        0 => V2UserType::Nomis,
        1 => V2UserType::Delius,
        _ => V2UserType::External,
    };
    let is_nomis = user_type == V2UserType::Nomis;
    let is_delius = user_type == V2UserType::Delius;

    V2User {
        id: Id::new(),
        name: format!("V2 User {i}"),
        username: format!("V2_USER_{i}"),
        email: Some(format!("v2user{i}@justice.example")),
        user_type,
        nomis_staff_id: is_nomis.then(|| 50_000 + i as i64),
        active_nomis_caseload_id: is_nomis.then(|| "LEI".to_string()),
        delius_staff_code: is_delius.then(|| format!("N01A{i:03}")),
        delius_team_codes: is_delius.then(|| vec!["N01T01".to_string(), format!("N01T{i:02}")]),
        is_enabled: true,
        is_active: i % 4 != 0,
        created_at: timestamp(i),
        updated_at: Some(timestamp(i + 500)),
    }
}

pub fn v1_application(i: usize, creator: &NomisUser) -> Application {
    Application {
        id: Id::new(),
        crn: format!("X{:06}", i),
        noms_number: Some(format!("A{:04}BC", i)),
        created_by_legacy_user_id: creator.id,
        created_by_unified_user_id: None,
        data: Some(json!({ "basic-information": { "name": format!("Applicant {i}") } })),
        document: Some(json!({})),
        created_at: timestamp(i),
        submitted_at: (i % 2 == 0).then(|| timestamp(i + 60)),
        abandoned_at: None,
        referring_prison_code: Some("BXI".to_string()),
        preferred_areas: None,
        hdc_eligibility_date: NaiveDate::from_ymd_opt(2025, 1, 1 + (i % 28) as u32),
        conditional_release_date: NaiveDate::from_ymd_opt(2025, 6, 1),
        telephone_number: None,
        application_origin: "homelessPrevention".to_string(),
        bail_hearing_date: None,
        relations: RelationsAvailability::Available,
    }
}

pub fn v2_application(i: usize, creator: &V2User) -> V2Application {
    V2Application {
        id: Id::new(),
        crn: format!("V{:06}", i),
        noms_number: (i % 3 != 0).then(|| format!("B{:04}CD", i)),
        created_by_user_id: creator.id,
        data: Some(json!({ "eligibility": { "confirm": "yes" } })),
        document: None,
        created_at: timestamp(i),
        submitted_at: None,
        abandoned_at: (i % 10 == 0).then(|| timestamp(i + 90)),
        referring_prison_code: None,
        preferred_areas: Some("Leeds | Bradford".to_string()),
        hdc_eligibility_date: None,
        conditional_release_date: None,
        telephone_number: Some(format!("0113 000 {:04}", i)),
        application_origin: if i % 2 == 0 { "courtBail" } else { "prisonBail" }.to_string(),
        bail_hearing_date: NaiveDate::from_ymd_opt(2025, 3, 1 + (i % 28) as u32),
    }
}

/// Source row counts for one test.
#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub nomis_users: usize,
    pub external_users: usize,
    pub v2_users: usize,
    pub v2_applications: usize,
    pub v1_applications: usize,
}

impl Scenario {
    /// 110 Nomis, 120 external and 130 v2 users; 102 v2 and 103 v1 applications.
    pub fn standard() -> Self {
        Self {
            nomis_users: 110,
            external_users: 120,
            v2_users: 130,
            v2_applications: 102,
            v1_applications: 103,
        }
    }

    pub fn small() -> Self {
        Self {
            nomis_users: 7,
            external_users: 5,
            v2_users: 6,
            v2_applications: 4,
            v1_applications: 3,
        }
    }

    pub fn build(&self) -> Seeded {
        let nomis_users: Vec<_> = (0..self.nomis_users).map(nomis_user).collect();
        let external_users: Vec<_> = (0..self.external_users).map(external_user).collect();
        let v2_users: Vec<_> = (0..self.v2_users).map(v2_user).collect();

        let v1_applications = (0..self.v1_applications)
            .map(|i| v1_application(i, &nomis_users[i % nomis_users.len()]))
            .collect();
        let v2_applications = (0..self.v2_applications)
            .map(|i| v2_application(i, &v2_users[i % v2_users.len()]))
            .collect();

        Seeded {
            nomis_users,
            external_users,
            v2_users,
            v1_applications,
            v2_applications,
        }
    }
}

/// Source rows written for a test.
#[derive(Debug, Clone)]
pub struct Seeded {
    pub nomis_users: Vec<NomisUser>,
    pub external_users: Vec<ExternalUser>,
    pub v2_users: Vec<V2User>,
    pub v1_applications: Vec<Application>,
    pub v2_applications: Vec<V2Application>,
}

impl Seeded {
    /// Write every row, parents before children.
    pub async fn save(&self, deps: &MigrationDeps) -> Result<()> {
        deps.nomis_users
            .save_all_and_flush(self.nomis_users.clone())
            .await?;
        deps.external_users
            .save_all_and_flush(self.external_users.clone())
            .await?;
        deps.v2_users.save_all_and_flush(self.v2_users.clone()).await?;
        deps.applications
            .save_all_and_flush(self.v1_applications.clone())
            .await?;
        deps.v2_applications
            .save_all_and_flush(self.v2_applications.clone())
            .await?;
        Ok(())
    }
}
