pub mod application;
pub mod v2_application;

pub use application::{Application, RelationsAvailability};
pub use v2_application::V2Application;
