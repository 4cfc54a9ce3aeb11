//! Request pipeline: bearer token authentication, then identity resolution.
//!
//! Authorization guards live in [`crate::rbac::middleware`].
pub mod auth;
pub mod context;
pub mod identity;

pub use auth::{AuthLayer, AuthService, Authenticator, Claims, JwksCache};
pub use context::{CurrentUser, ResourceId, TokenIdentity};
pub use identity::{
    ClaimIdentityResolver, DirectoryIdentityResolver, IdentityLayer, IdentityResolver,
    IdentityService,
};
