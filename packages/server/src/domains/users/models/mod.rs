pub mod external_user;
pub mod nomis_user;
pub mod unified_user;
pub mod v2_user;

pub use external_user::ExternalUser;
pub use nomis_user::NomisUser;
pub use unified_user::{UnifiedUser, UserType};
pub use v2_user::{V2User, V2UserType};
