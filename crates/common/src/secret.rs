//! Secret wrappers for credentials that must never reach the logs.
//!
//! Two values in this workspace are sensitive: the room API key used to mint
//! join tokens, and the client token handed to the media session. Both are
//! carried as [`SecretString`], whose `Debug` output is redacted, so structs
//! holding them can derive `Debug` and be passed to `tracing` safely.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! let api_key = SecretString::from("KEY0123");
//! assert!(!format!("{api_key:?}").contains("KEY0123"));
//!
//! // Reading the value is always an explicit call.
//! let header = format!("Bearer {}", api_key.expose_secret());
//! assert!(header.ends_with("KEY0123"));
//! ```

pub use secrecy::{ExposeSecret, SecretString};
