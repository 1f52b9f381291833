//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports [`secrecy`] types. Everything that grants access to a meeting
//! or to the media provider travels as a `SecretString`:
//!
//! - provider connection tokens handed to fans and organizers
//! - the provider API secret
//! - the HS256 key used to verify caller tokens
//! - bearer tokens taken from request headers
//!
//! `SecretString` implements `Debug` with redaction, so deriving `Debug` on a
//! struct that holds one never prints the value. The value is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Issued {
//!     connection_id: String,
//!     token: SecretString,
//! }
//!
//! let issued = Issued {
//!     connection_id: "con_123".to_string(),
//!     token: SecretString::from("wss://media?token=abc"),
//! };
//!
//! assert!(!format!("{issued:?}").contains("abc"));
//! assert_eq!(issued.token.expose_secret(), "wss://media?token=abc");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("provider-secret");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("provider-secret"));
    }

    #[test]
    fn test_expose_secret_returns_inner_value() {
        let secret = SecretString::from("tok_1");
        assert_eq!(secret.expose_secret(), "tok_1");
    }

    #[test]
    fn test_deserialize_keeps_value_hidden() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct ProviderCredentials {
            url: String,
            secret: SecretString,
        }

        let json = r#"{"url": "https://media.local", "secret": "MY_SECRET"}"#;
        let creds: ProviderCredentials = serde_json::from_str(json).expect("deserialize");

        assert_eq!(creds.secret.expose_secret(), "MY_SECRET");
        let debug = format!("{creds:?}");
        assert!(debug.contains("https://media.local"));
        assert!(!debug.contains("MY_SECRET"));
    }
}
