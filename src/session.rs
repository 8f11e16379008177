//! Opaque authenticated session threaded through the store clients.

/// Credential handle for the document store and board service. Issued by the
/// excluded auth layer; this crate only passes it along.
#[derive(Clone)]
pub struct AuthSession {
    account: String,
    token: String,
}

impl AuthSession {
    pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
        AuthSession {
            account: account.into(),
            token: token.into(),
        }
    }

    /// The account the session acts as. Folder ownership checks compare
    /// against this.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Raw bearer token for concrete API clients.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep the token out of log output
        f.debug_struct("AuthSession")
            .field("account", &self.account)
            .field("token", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let s = AuthSession::new("ops@example.com", "secret-token");
        let dbg = format!("{:?}", s);
        assert!(dbg.contains("ops@example.com"));
        assert!(!dbg.contains("secret-token"));
    }
}
