// Domains touched by the user/application consolidation
pub mod applications;
pub mod users;
