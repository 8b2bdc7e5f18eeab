//! Feed Credentials
//!
//! The credential source hands the feed an access token plus a loading flag.
//! The feed holds a connection only while the source is settled and a token
//! is present.
//!
//! # Readiness
//!
//! | `is_loading` | `token`  | Feed reaction              |
//! |--------------|----------|----------------------------|
//! | `true`       | any      | tear down, wait            |
//! | `false`      | present  | connect (or reconnect)     |
//! | `false`      | absent   | tear down                  |

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while building credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The access token was empty or whitespace.
    #[error("access token cannot be empty")]
    EmptyToken,
}

// =============================================================================
// Access Token
// =============================================================================

/// Bearer token used to authenticate the feed transport and REST calls.
///
/// `Debug` and `Display` redact the value for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty after trimming.
    pub fn new(token: impl Into<String>) -> Result<Self, CredentialError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(CredentialError::EmptyToken);
        }
        Ok(Self(token))
    }

    /// Raw token value, for building transport URLs and auth headers.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&"[REDACTED]").finish()
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// =============================================================================
// Credential
// =============================================================================

/// Snapshot of the credential source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credential {
    /// Current access token, if the user is signed in.
    pub token: Option<AccessToken>,
    /// Whether the credential source is still resolving.
    pub is_loading: bool,
}

impl Credential {
    /// Credential source still resolving; the feed must not connect.
    #[must_use]
    pub const fn loading() -> Self {
        Self {
            token: None,
            is_loading: true,
        }
    }

    /// Settled credential with no token (signed out).
    #[must_use]
    pub const fn signed_out() -> Self {
        Self {
            token: None,
            is_loading: false,
        }
    }

    /// Settled credential carrying a token.
    #[must_use]
    pub const fn with_token(token: AccessToken) -> Self {
        Self {
            token: Some(token),
            is_loading: false,
        }
    }

    /// Token usable for a connection attempt, if the source is settled.
    #[must_use]
    pub const fn ready_token(&self) -> Option<&AccessToken> {
        if self.is_loading {
            None
        } else {
            self.token.as_ref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_rejected() {
        assert_eq!(AccessToken::new(""), Err(CredentialError::EmptyToken));
        assert_eq!(AccessToken::new("   "), Err(CredentialError::EmptyToken));
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = AccessToken::new("super-secret").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(token.expose(), "super-secret");
    }

    #[test]
    fn ready_token_requires_settled_source() {
        let token = AccessToken::new("T1").unwrap();

        let loading = Credential {
            token: Some(token.clone()),
            is_loading: true,
        };
        assert!(loading.ready_token().is_none());

        assert!(Credential::signed_out().ready_token().is_none());
        assert_eq!(Credential::with_token(token.clone()).ready_token(), Some(&token));
    }
}
