//! Field-by-field mappings from source rows to the unified tables.
//!
//! Every target field is assigned explicitly. Each source populates a
//! different subset of the optional origin fields, and the groups that do not
//! belong to a user's origin are always `None`. Target ids are the source ids.

use crate::domains::applications::models::{Application, RelationsAvailability, V2Application};
use crate::domains::users::models::{
    ExternalUser, NomisUser, UnifiedUser, UserType, V2User, V2UserType,
};

/// Account type given to v2 Nomis users. The v2 service never stored one.
pub const DEFAULT_NOMIS_ACCOUNT_TYPE: &str = "GENERAL";

/// External type given to v2 external users. The v2 service never stored one.
pub const DEFAULT_EXTERNAL_TYPE: &str = "NACRO";

pub fn unified_from_nomis(source: NomisUser) -> UnifiedUser {
    UnifiedUser {
        id: source.id.rebrand(),
        name: source.name,
        email: source.email,
        username: source.nomis_username,
        user_type: UserType::Nomis,
        nomis_staff_id: Some(source.nomis_staff_id),
        nomis_account_type: Some(source.account_type),
        active_nomis_caseload_id: source.active_caseload_id,
        delius_staff_code: None,
        delius_team_codes: None,
        external_type: None,
        is_active: source.is_active,
        is_enabled: source.is_enabled,
        created_at: source.created_at,
        updated_at: source.updated_at,
    }
}

/// External users have no active flag of their own; they are always active.
pub fn unified_from_external(source: ExternalUser) -> UnifiedUser {
    UnifiedUser {
        id: source.id.rebrand(),
        name: source.name,
        email: Some(source.email),
        username: source.username,
        user_type: UserType::External,
        nomis_staff_id: None,
        nomis_account_type: None,
        active_nomis_caseload_id: None,
        delius_staff_code: None,
        delius_team_codes: None,
        external_type: Some(source.origin),
        is_active: true,
        is_enabled: source.is_enabled,
        created_at: source.created_at,
        updated_at: source.updated_at,
    }
}

/// Only the origin group matching the v2 user's type is copied. Nomis and
/// external users get the default account type and external type.
pub fn unified_from_v2(source: V2User) -> UnifiedUser {
    let (
        user_type,
        nomis_staff_id,
        nomis_account_type,
        active_nomis_caseload_id,
        delius_staff_code,
        delius_team_codes,
        external_type,
    ) = match source.user_type {
        V2UserType::Nomis => (
            UserType::Nomis,
            source.nomis_staff_id,
            Some(DEFAULT_NOMIS_ACCOUNT_TYPE.to_string()),
            source.active_nomis_caseload_id,
            None,
            None,
            None,
        ),
        V2UserType::Delius => (
            UserType::Delius,
            None,
            None,
            None,
            source.delius_staff_code,
            source.delius_team_codes,
            None,
        ),
        V2UserType::External => (
            UserType::External,
            None,
            None,
            None,
            None,
            None,
            Some(DEFAULT_EXTERNAL_TYPE.to_string()),
        ),
    };

    UnifiedUser {
        id: source.id.rebrand(),
        name: source.name,
        email: source.email,
        username: source.username,
        user_type,
        nomis_staff_id,
        nomis_account_type,
        active_nomis_caseload_id,
        delius_staff_code,
        delius_team_codes,
        external_type,
        is_active: source.is_active,
        is_enabled: source.is_enabled,
        created_at: source.created_at,
        updated_at: source.updated_at,
    }
}

/// Backfill the unified creator on a v1 application. Nothing else changes.
pub fn link_unified_creator(application: Application, creator: &UnifiedUser) -> Application {
    Application {
        created_by_unified_user_id: Some(creator.id),
        ..application
    }
}

/// Copy a v2 application into the unified table.
///
/// The legacy creator column points at the placeholder Nomis row that shares
/// the creator's id. Status updates, notes, assessment and assignments still
/// live in the v2 tables, which `RelationsAvailability::NotYetMigrated` records.
pub fn application_from_v2(source: V2Application, creator: &UnifiedUser) -> Application {
    Application {
        id: source.id.rebrand(),
        crn: source.crn,
        noms_number: source.noms_number,
        created_by_legacy_user_id: creator.id.rebrand(),
        created_by_unified_user_id: Some(creator.id),
        data: source.data,
        document: source.document,
        created_at: source.created_at,
        submitted_at: source.submitted_at,
        abandoned_at: source.abandoned_at,
        referring_prison_code: source.referring_prison_code,
        preferred_areas: source.preferred_areas,
        hdc_eligibility_date: source.hdc_eligibility_date,
        conditional_release_date: source.conditional_release_date,
        telephone_number: source.telephone_number,
        application_origin: source.application_origin,
        bail_hearing_date: source.bail_hearing_date,
        relations: RelationsAvailability::NotYetMigrated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Id;
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::json;

    fn nomis_user() -> NomisUser {
        NomisUser {
            id: Id::new(),
            name: "Prison Officer".to_string(),
            nomis_username: "POFFICER".to_string(),
            email: Some("officer@justice.example".to_string()),
            nomis_staff_id: 4821,
            account_type: "ADMIN".to_string(),
            is_enabled: true,
            is_active: false,
            active_caseload_id: Some("BXI".to_string()),
            created_at: Utc.with_ymd_and_hms(2023, 4, 1, 9, 30, 0).unwrap(),
            updated_at: None,
        }
    }

    fn v2_user(user_type: V2UserType) -> V2User {
        V2User {
            id: Id::new(),
            name: "Any Worker".to_string(),
            username: "AWORKER".to_string(),
            email: Some("worker@justice.example".to_string()),
            user_type,
            nomis_staff_id: Some(991),
            active_nomis_caseload_id: Some("LEI".to_string()),
            delius_staff_code: Some("N01A123".to_string()),
            delius_team_codes: Some(vec!["N01T01".to_string(), "N01T02".to_string()]),
            is_enabled: false,
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            updated_at: Some(Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap()),
        }
    }

    fn unified_creator() -> UnifiedUser {
        unified_from_v2(v2_user(V2UserType::Delius))
    }

    #[test]
    fn test_nomis_user_keeps_nomis_fields() {
        let source = nomis_user();
        let user = unified_from_nomis(source.clone());

        assert_eq!(user.id.into_uuid(), source.id.into_uuid());
        assert_eq!(user.user_type, UserType::Nomis);
        assert_eq!(user.username, "POFFICER");
        assert_eq!(user.nomis_staff_id, Some(4821));
        assert_eq!(user.nomis_account_type.as_deref(), Some("ADMIN"));
        assert_eq!(user.active_nomis_caseload_id.as_deref(), Some("BXI"));
        assert!(!user.is_active);
        assert!(user.delius_staff_code.is_none());
        assert!(user.delius_team_codes.is_none());
        assert!(user.external_type.is_none());
        assert!(user.has_consistent_origin_fields());
    }

    #[test]
    fn test_external_user_is_always_active() {
        let source = ExternalUser {
            id: Id::new(),
            username: "cas-referrer".to_string(),
            name: "Housing Referrer".to_string(),
            email: "referrer@charity.example".to_string(),
            origin: "CRC".to_string(),
            is_enabled: false,
            created_at: Utc.with_ymd_and_hms(2022, 11, 3, 10, 0, 0).unwrap(),
            updated_at: None,
        };
        let user = unified_from_external(source.clone());

        assert_eq!(user.id.into_uuid(), source.id.into_uuid());
        assert_eq!(user.user_type, UserType::External);
        assert_eq!(user.external_type.as_deref(), Some("CRC"));
        assert_eq!(user.email.as_deref(), Some("referrer@charity.example"));
        assert!(user.is_active);
        assert!(!user.is_enabled);
        assert!(user.nomis_staff_id.is_none());
        assert!(user.nomis_account_type.is_none());
        assert!(user.delius_staff_code.is_none());
    }

    #[test]
    fn test_v2_nomis_user_gets_default_account_type_and_no_delius_fields() {
        let user = unified_from_v2(v2_user(V2UserType::Nomis));

        assert_eq!(user.user_type, UserType::Nomis);
        assert_eq!(user.nomis_staff_id, Some(991));
        assert_eq!(user.nomis_account_type.as_deref(), Some("GENERAL"));
        assert_eq!(user.active_nomis_caseload_id.as_deref(), Some("LEI"));
        assert!(user.delius_staff_code.is_none());
        assert!(user.delius_team_codes.is_none());
        assert!(user.external_type.is_none());
        assert!(user.has_consistent_origin_fields());
    }

    #[test]
    fn test_v2_delius_user_copies_delius_fields_only() {
        let user = unified_from_v2(v2_user(V2UserType::Delius));

        assert_eq!(user.user_type, UserType::Delius);
        assert_eq!(user.delius_staff_code.as_deref(), Some("N01A123"));
        assert_eq!(user.delius_team_codes.as_ref().map(Vec::len), Some(2));
        assert!(user.nomis_staff_id.is_none());
        assert!(user.nomis_account_type.is_none());
        assert!(user.active_nomis_caseload_id.is_none());
        assert!(user.external_type.is_none());
        assert!(user.has_consistent_origin_fields());
    }

    #[test]
    fn test_v2_external_user_gets_default_external_type() {
        let source = v2_user(V2UserType::External);
        let user = unified_from_v2(source.clone());

        assert_eq!(user.user_type, UserType::External);
        assert_eq!(user.external_type.as_deref(), Some("NACRO"));
        assert!(user.nomis_staff_id.is_none());
        assert!(user.delius_team_codes.is_none());
        assert_eq!(user.is_active, source.is_active);
        assert_eq!(user.is_enabled, source.is_enabled);
        assert_eq!(user.updated_at, source.updated_at);
    }

    #[test]
    fn test_v2_users_of_every_type_copy_shared_fields() {
        for user_type in [V2UserType::Nomis, V2UserType::Delius, V2UserType::External] {
            let source = v2_user(user_type);
            let user = unified_from_v2(source.clone());

            assert_eq!(user.id.into_uuid(), source.id.into_uuid());
            assert_eq!(user.name, source.name);
            assert_eq!(user.email, source.email);
            assert_eq!(user.username, source.username);
            assert_eq!(user.is_active, source.is_active);
            assert_eq!(user.is_enabled, source.is_enabled);
            assert_eq!(user.created_at, source.created_at);
            assert_eq!(user.updated_at, source.updated_at);
            assert!(user.has_consistent_origin_fields(), "{user_type:?}");
        }
    }

    #[test]
    fn test_link_unified_creator_only_sets_the_link() {
        let creator = unified_creator();
        let application = Application {
            id: Id::new(),
            crn: "X320741".to_string(),
            noms_number: Some("A1234AB".to_string()),
            created_by_legacy_user_id: creator.id.rebrand(),
            created_by_unified_user_id: None,
            data: Some(json!({"basic-information": {}})),
            document: None,
            created_at: Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
            submitted_at: None,
            abandoned_at: None,
            referring_prison_code: Some("BXI".to_string()),
            preferred_areas: None,
            hdc_eligibility_date: None,
            conditional_release_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            telephone_number: None,
            application_origin: "homelessPrevention".to_string(),
            bail_hearing_date: None,
            relations: RelationsAvailability::Available,
        };

        let linked = link_unified_creator(application.clone(), &creator);

        assert_eq!(linked.created_by_unified_user_id, Some(creator.id));
        assert_eq!(
            Application {
                created_by_unified_user_id: None,
                ..linked
            },
            application
        );
    }

    #[test]
    fn test_v2_application_keeps_identity_and_marks_relations_pending() {
        let creator = unified_creator();
        let source = V2Application {
            id: Id::new(),
            crn: "X99887".to_string(),
            noms_number: None,
            created_by_user_id: creator.id.rebrand(),
            data: Some(json!({"eligibility": {"confirm": "yes"}})),
            document: Some(json!({})),
            created_at: Utc.with_ymd_and_hms(2024, 5, 20, 14, 0, 0).unwrap(),
            submitted_at: Some(Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap()),
            abandoned_at: None,
            referring_prison_code: None,
            preferred_areas: Some("Leeds | Bradford".to_string()),
            hdc_eligibility_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            conditional_release_date: None,
            telephone_number: Some("0113 000 0000".to_string()),
            application_origin: "courtBail".to_string(),
            bail_hearing_date: NaiveDate::from_ymd_opt(2024, 6, 2),
        };

        let application = application_from_v2(source.clone(), &creator);

        assert_eq!(application.id.into_uuid(), source.id.into_uuid());
        assert_eq!(application.crn, source.crn);
        assert_eq!(application.created_by_unified_user_id, Some(creator.id));
        assert_eq!(
            application.created_by_legacy_user_id.into_uuid(),
            source.created_by_user_id.into_uuid()
        );
        assert_eq!(application.data, source.data);
        assert_eq!(application.submitted_at, source.submitted_at);
        assert_eq!(application.preferred_areas, source.preferred_areas);
        assert_eq!(application.bail_hearing_date, source.bail_hearing_date);
        assert_eq!(application.application_origin, "courtBail");
        assert_eq!(application.relations, RelationsAvailability::NotYetMigrated);
    }
}
