//! Capability check in front of every mutation.
//!
//! # Security
//! - The configured token lives in a `Zeroizing` container
//! - Debug output never shows the token, only whether one is set
//! - Token comparison is constant-time over the bytes

use crate::Result;
use crate::error::FptError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Request header carrying the write token.
pub const WRITE_TOKEN_HEADER: &str = "X-FPT-Write-Token";

/// Random bytes in a generated token.
const TOKEN_BYTES: usize = 24;

/// Whether writes are enabled and with which token.
#[derive(Clone, Default)]
pub struct WriteCredential {
    enabled: bool,
    token: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for WriteCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteCredential")
            .field("enabled", &self.enabled)
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl WriteCredential {
    /// Creates a credential; an empty token counts as none.
    pub fn new(enabled: bool, token: Option<String>) -> Self {
        Self {
            enabled,
            token: token.filter(|t| !t.is_empty()).map(Zeroizing::new),
        }
    }

    /// Writes switched off.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// True when the enabled flag is set.
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True when a non-empty token is configured.
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// Checks a request's token against the credential.
///
/// Never touches the store.
///
/// # Errors
/// - [`FptError::WriteDisabled`] when writes are off or no token is configured
/// - [`FptError::InvalidToken`] when `provided` is missing, empty or different
pub fn assert_write_allowed(credential: &WriteCredential, provided: Option<&str>) -> Result<()> {
    let Some(expected) = credential.token.as_ref().filter(|_| credential.enabled) else {
        return Err(FptError::WriteDisabled);
    };

    let provided = provided.unwrap_or_default();
    if provided.is_empty() {
        return Err(FptError::InvalidToken);
    }

    // Slices of different lengths compare unequal
    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("Rejected write with a mismatched token");
        Err(FptError::InvalidToken)
    }
}

/// Generates a fresh write token: 24 random bytes, URL-safe base64 without
/// padding.
pub fn generate_write_token() -> String {
    let bytes: Zeroizing<[u8; TOKEN_BYTES]> = Zeroizing::new(rand::random());
    URL_SAFE_NO_PAD.encode(bytes.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_gate_disabled() {
        let off = WriteCredential::new(false, Some("secret".to_string()));
        assert!(matches!(
            assert_write_allowed(&off, Some("secret")),
            Err(FptError::WriteDisabled)
        ));

        let no_token = WriteCredential::new(true, Some(String::new()));
        assert!(!no_token.has_token());
        assert!(matches!(
            assert_write_allowed(&no_token, Some("")),
            Err(FptError::WriteDisabled)
        ));

        assert!(matches!(
            assert_write_allowed(&WriteCredential::disabled(), None),
            Err(FptError::WriteDisabled)
        ));
    }

    #[test]
    fn test_write_gate_rejects_bad_tokens() {
        let credential = WriteCredential::new(true, Some("secret".to_string()));
        for provided in [None, Some(""), Some("Secret"), Some("secret2"), Some("secre")] {
            assert!(
                matches!(
                    assert_write_allowed(&credential, provided),
                    Err(FptError::InvalidToken)
                ),
                "{:?} should be rejected",
                provided
            );
        }
    }

    #[test]
    fn test_write_gate_accepts_exact_token() {
        let credential = WriteCredential::new(true, Some("secret".to_string()));
        assert!(assert_write_allowed(&credential, Some("secret")).is_ok());
    }

    #[test]
    fn test_debug_hides_token() {
        let credential = WriteCredential::new(true, Some("hunter2".to_string()));
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("has_token: true"));
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_write_token();
        assert_eq!(token.len(), 32);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(token, generate_write_token());
    }
}
