//! Typed ID definitions for every table the migration touches.
//!
//! The model structs double as the entity markers, so `Id<NomisUser>` and
//! `NomisUserId` are the same type.

pub use super::id::Id;

use crate::domains::applications::models::{Application, V2Application};
use crate::domains::users::models::{ExternalUser, NomisUser, UnifiedUser, V2User};

/// Legacy Nomis user (`nomis_users`).
pub type NomisUserId = Id<NomisUser>;

/// Legacy external user (`external_users`).
pub type ExternalUserId = Id<ExternalUser>;

/// User from the parallel v2 service (`v2_users`).
pub type V2UserId = Id<V2User>;

/// Consolidated user (`unified_users`).
pub type UnifiedUserId = Id<UnifiedUser>;

/// Application in the unified table (`applications`).
pub type ApplicationId = Id<Application>;

/// Application from the parallel v2 service (`v2_applications`).
pub type V2ApplicationId = Id<V2Application>;
