//! Shared primitives for the Entropic host.
//!
//! Types here carry no control-plane behaviour; they are the small pieces every
//! other crate agrees on.
//!
//! ## Architecture
//!
//! - **common** (this crate): error location tracking, secret wrappers
//! - **engine-core**: frame transport, health supervision, command relay
//! - **entropic**: host application wiring everything together

pub mod error;
pub mod redacted_token;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_token::RedactedToken;

#[cfg(test)]
mod tests;
