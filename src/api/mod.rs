//! API route definitions
//!
//! One router module per resource family, composed under /api/v1 in
//! [build_app](crate::app::build_app). Health probes live outside the prefix.

pub mod error;
pub mod extract;
pub mod health;
pub mod me;
pub mod posts;
pub mod token;
pub mod users;
pub mod validate;
