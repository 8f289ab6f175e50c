//! Authentication and authorization core.
//!
//! Argon2id password hashing, HS256 tokens bound to server-side sessions,
//! and a static role-to-permission table. Persistence sits behind the
//! [`IdentityStore`], [`SessionStore`] and [`TokenBlacklist`] traits.

pub mod blacklist;
pub mod error;
pub mod identity;
pub mod password;
pub mod permissions;
pub mod service;
pub mod session;
pub mod store;
pub mod throttle;
pub mod token;

pub use blacklist::{MemoryTokenBlacklist, TokenBlacklist};
pub use error::{AuthError, PasswordError, TokenError};
pub use identity::{IdentityStore, MemoryIdentityStore, Principal, PublicProfile};
pub use password::{validate_password_strength, HashingConfig, PasswordHasher};
pub use permissions::{Permission, PermissionEngine, Role};
pub use service::{AuthService, LoginOutcome, RegisterRequest, RequestContext, SweepReport};
pub use session::{ClientMetadata, MemorySessionStore, Session, SessionStore};
pub use store::{RetryPolicy, StoreError};
pub use throttle::LoginThrottle;
pub use token::{Claims, SigningKey, TokenConfig, TokenPair, TokenService, TokenType};
