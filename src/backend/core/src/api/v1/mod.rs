//! V1 API: profile, self-introspection and authorization administration.

pub mod routes;

pub use routes::{v1_router, V1_PREFIX};
