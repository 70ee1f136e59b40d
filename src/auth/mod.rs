pub mod claims;
pub mod context;
pub mod jwks;
pub mod middleware;
pub mod session;
pub mod sign_in;
pub mod sync;

pub use claims::AuthClaims;
pub use context::AuthContext;
pub use jwks::JwksCache;
pub use middleware::{MaybeAuth, RequireAuth, SESSION_COOKIE};
pub use session::{Session, SessionLimits, SessionStore};
pub use sign_in::{MicrosoftCredential, MicrosoftSignIn};
