//! Identity providers for DraftSync
//!
//! Resolve the bearer token of a request to an opaque user id. Supported
//! backends:
//! - Token file (`user:sha256-hex-of-token` lines)
//! - Static in-memory token map (development and tests)

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Identity lookup result
#[derive(Debug, Clone, PartialEq)]
pub enum AuthResult {
    /// Token accepted; carries the user id
    Success(String),
    /// Token unknown
    Failed,
    /// Provider could not answer
    Error(String),
}

impl AuthResult {
    /// The user id, if the lookup succeeded.
    pub fn user_id(self) -> Option<String> {
        match self {
            AuthResult::Success(user) => Some(user),
            _ => None,
        }
    }
}

/// Identity provider trait
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a user id
    async fn identify(&self, token: &str) -> AuthResult;
}

/// Hex SHA-256 of a token, as stored in token files.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Token-file identity provider
///
/// Each line maps a user id to the SHA-256 of its token, so the file never
/// holds raw tokens:
/// ```text
/// # user:sha256(token)
/// alice:2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b
/// ```
#[derive(Clone)]
pub struct TokenFileProvider {
    digests: HashMap<String, String>, // digest -> user id
}

impl TokenFileProvider {
    /// Load a token file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read token file: {}", e))?;

        Self::parse(&content)
    }

    /// Parse token file content
    pub fn from_content(content: &str) -> Result<Self, String> {
        Self::parse(content)
    }

    fn parse(content: &str) -> Result<Self, String> {
        let mut digests = HashMap::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((user, digest)) = line.split_once(':') else {
                return Err(format!("Invalid token line: {}", line));
            };
            let user = user.trim();
            let digest = digest.trim().to_ascii_lowercase();

            if user.is_empty() || digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(format!("Invalid token line (empty user or bad digest): {}", line));
            }

            digests.insert(digest, user.to_string());
        }

        if digests.is_empty() {
            return Err("No valid tokens found in token file".to_string());
        }

        Ok(Self { digests })
    }
}

#[async_trait]
impl IdentityProvider for TokenFileProvider {
    async fn identify(&self, token: &str) -> AuthResult {
        if token.is_empty() {
            return AuthResult::Failed;
        }
        match self.digests.get(&token_digest(token)) {
            Some(user) => AuthResult::Success(user.clone()),
            None => AuthResult::Failed,
        }
    }
}

/// Static token map (raw token -> user id)
#[derive(Clone, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, String>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: &str, user_id: &str) -> Self {
        self.tokens.insert(token.to_string(), user_id.to_string());
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn identify(&self, token: &str) -> AuthResult {
        match self.tokens.get(token) {
            Some(user) => AuthResult::Success(user.clone()),
            None => AuthResult::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_file() {
        let content = format!(
            "\n# comment\nalice:{}\nbob:{}\n",
            token_digest("alice-secret"),
            token_digest("bob-secret").to_uppercase()
        );
        let provider = TokenFileProvider::from_content(&content).unwrap();
        assert_eq!(provider.digests.len(), 2);
    }

    #[test]
    fn test_parse_token_file_empty() {
        assert!(TokenFileProvider::from_content("\n# Comment\n\n").is_err());
    }

    #[test]
    fn test_parse_token_file_invalid() {
        assert!(TokenFileProvider::from_content("line_without_colon").is_err());
        assert!(TokenFileProvider::from_content("alice:nothex").is_err());
    }

    #[tokio::test]
    async fn test_token_file_identify() {
        let content = format!("alice:{}", token_digest("s3cret"));
        let provider = TokenFileProvider::from_content(&content).unwrap();
        assert_eq!(provider.identify("s3cret").await, AuthResult::Success("alice".into()));
        assert_eq!(provider.identify("wrong").await, AuthResult::Failed);
        assert_eq!(provider.identify("").await, AuthResult::Failed);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new().with_token("t1", "alice");
        assert_eq!(provider.identify("t1").await.user_id(), Some("alice".into()));
        assert_eq!(provider.identify("t2").await.user_id(), None);
    }
}
