//! Placeholder rows in the legacy user tables for v2 users.
//!
//! Tables that have not moved to `unified_users` yet still hold foreign keys
//! into `nomis_users` or `external_users`. v2 users never had a row in either,
//! so each one gets a dummy row in both, keyed by the user's id, and any such
//! reference resolves.
//!
//! This is a compatibility shim. The rows carry no real data and can be
//! deleted (see [`is_placeholder_username`]) once nothing joins through the
//! legacy tables any more.

use crate::data_migrations::reconcile::{DEFAULT_EXTERNAL_TYPE, DEFAULT_NOMIS_ACCOUNT_TYPE};
use crate::domains::users::models::{ExternalUser, NomisUser, UnifiedUser};

/// Name and email written into every placeholder row.
pub const PLACEHOLDER_NAME: &str = "DUMMY_USER";

/// Placeholder usernames are this prefix followed by the user id.
pub const PLACEHOLDER_USERNAME_PREFIX: &str = "DUMMY_USER_";

pub const PLACEHOLDER_STAFF_ID: i64 = 0;

pub fn placeholder_username(user: &UnifiedUser) -> String {
    format!("{PLACEHOLDER_USERNAME_PREFIX}{}", user.id)
}

pub fn is_placeholder_username(username: &str) -> bool {
    username.starts_with(PLACEHOLDER_USERNAME_PREFIX)
}

/// Legacy Nomis row standing in for `user`, whatever the user's real origin.
///
/// `created_at` comes from the unified user so reruns write identical rows.
pub fn nomis_placeholder(user: &UnifiedUser) -> NomisUser {
    NomisUser {
        id: user.id.rebrand(),
        name: PLACEHOLDER_NAME.to_string(),
        nomis_username: placeholder_username(user),
        email: Some(PLACEHOLDER_NAME.to_string()),
        nomis_staff_id: PLACEHOLDER_STAFF_ID,
        account_type: DEFAULT_NOMIS_ACCOUNT_TYPE.to_string(),
        is_enabled: true,
        is_active: true,
        active_caseload_id: None,
        created_at: user.created_at,
        updated_at: None,
    }
}

/// Legacy external row standing in for `user`, whatever the user's real origin.
pub fn external_placeholder(user: &UnifiedUser) -> ExternalUser {
    ExternalUser {
        id: user.id.rebrand(),
        username: placeholder_username(user),
        name: PLACEHOLDER_NAME.to_string(),
        email: PLACEHOLDER_NAME.to_string(),
        origin: DEFAULT_EXTERNAL_TYPE.to_string(),
        is_enabled: true,
        created_at: user.created_at,
        updated_at: None,
    }
}
