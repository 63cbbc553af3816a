//! Stateless sessions.
//!
//! All session state lives in a signed carrier held by the browser. Every
//! request decodes it again; nothing is kept server-side. A carrier is never
//! modified: refreshing the access token produces a new carrier that replaces
//! the old one.
//!
//! - [`claims`] - the credential and identity carried in a session
//! - [`codec`] - signing and verification of carriers
//! - [`refresh`] - access token lifecycle and the per-request session manager

pub mod claims;
pub mod codec;
pub mod refresh;

pub use claims::{Credential, ProviderCallback, RefreshedTokens, SessionClaims};
pub use codec::{CARRIER_VERSION, SessionCodec, SignedToken};
pub use refresh::{SessionManager, SessionResolution, TokenLifecycle, TokenRefresher};
