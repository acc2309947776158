//! Domain Models
//!
//! Users, applications, and identity validations. Records are value types;
//! persistence lives behind the capability traits in `repository`.

pub mod application;
pub mod user;
pub mod validation;

pub use application::*;
pub use user::*;
pub use validation::*;
