//! Authentication and signing for the futures API.
//!
//! - **Secure credentials**: the API secret is wrapped in `SecretString` to
//!   prevent accidental logging and to zero memory on drop.
//! - **HMAC-SHA256 signing**: the signing scheme required by signed
//!   `/fapi` and `/sapi` endpoints — sign the urlencoded query, append
//!   `signature`, send the key in `X-MBX-APIKEY`.
//! - **Environment loading**: credentials load from env vars or `.env`.

mod credentials;
mod error;
mod signer;

pub use credentials::ApiCredentials;
pub use error::AuthError;
pub use signer::RequestSigner;
