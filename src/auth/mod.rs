//! Azure AD app-only authentication.
//!
//! Provides application credentials (certificate or client secret), the OAuth2
//! client-credentials token request, and the scoped session lifecycle built on top.

pub mod credential;
pub mod oauth;
pub mod session;

pub use credential::{CertificateCredential, ClientCredential, ClientSecret, CredentialSecret};
pub use oauth::IdentityClient;
pub use session::{with_session, Session, SessionProvider};
