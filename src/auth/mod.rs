//! Credential handling: token classification, persisted storage, and the
//! session object with single-flight refresh.

mod session;
mod store;
mod token;

pub use session::{SaveOutcome, Session};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use token::{AuthScheme, Credentials, TokenPayload, auth_header_for};

#[cfg(test)]
pub use store::MockTokenStore;
