use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which top-level map of the store a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    User,
    Page,
    Business,
}

impl TokenKind {
    pub const ALL: [TokenKind; 3] = [TokenKind::User, TokenKind::Page, TokenKind::Business];

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::User => "user",
            TokenKind::Page => "page",
            TokenKind::Business => "business",
        }
    }

    pub fn parse(value: &str) -> Option<TokenKind> {
        match value {
            "user" => Some(TokenKind::User),
            "page" => Some(TokenKind::Page),
            "business" => Some(TokenKind::Business),
            _ => None,
        }
    }
}

/// Stored credential plus metadata for one identity.
///
/// Invariant: `expires_at` in the past means the record must be re-validated
/// before use; `is_valid` reflects the last validation, not the present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub identity: String,
    pub access_token: String,
    pub token_type: TokenKind,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub is_valid: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl TokenRecord {
    pub fn new(kind: TokenKind, identity: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            access_token: access_token.into(),
            token_type: kind,
            expires_at: None,
            is_valid: true,
            scopes: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_expiry(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Scopes are kept sorted and deduplicated so serialized records and
    /// consent URLs are deterministic.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = normalize_scopes(scopes);
        self
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|at| at <= Utc::now()).unwrap_or(false)
    }

    /// True when the record expires inside the horizon. Records without an
    /// expiry never match.
    pub fn expires_within(&self, horizon: Duration) -> bool {
        match self.expires_at {
            Some(at) => at <= Utc::now() + horizon,
            None => false,
        }
    }
}

pub fn normalize_scopes(mut scopes: Vec<String>) -> Vec<String> {
    scopes.sort();
    scopes.dedup();
    scopes
}

/// One persisted entry: the record itself lives inside `token`, either as
/// tagged ciphertext (`encrypted: true`) or as a plain JSON string left over
/// from a pre-encryption store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub encrypted: bool,
    pub token: String,
    pub updated_at: DateTime<Utc>,
}

/// On-disk schema: three maps keyed by identity. No versioning; unknown
/// fields are dropped on rewrite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreFile {
    #[serde(default)]
    pub user_tokens: HashMap<String, StoredEntry>,
    #[serde(default)]
    pub page_tokens: HashMap<String, StoredEntry>,
    #[serde(default)]
    pub business_tokens: HashMap<String, StoredEntry>,
}

impl StoreFile {
    pub fn map(&self, kind: TokenKind) -> &HashMap<String, StoredEntry> {
        match kind {
            TokenKind::User => &self.user_tokens,
            TokenKind::Page => &self.page_tokens,
            TokenKind::Business => &self.business_tokens,
        }
    }

    pub fn map_mut(&mut self, kind: TokenKind) -> &mut HashMap<String, StoredEntry> {
        match kind {
            TokenKind::User => &mut self.user_tokens,
            TokenKind::Page => &mut self.page_tokens,
            TokenKind::Business => &mut self.business_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_window_checks() {
        let fresh = TokenRecord::new(TokenKind::User, "u1", "tok")
            .with_expiry(Some(Utc::now() + Duration::days(30)));
        assert!(!fresh.is_expired());
        assert!(!fresh.expires_within(Duration::hours(24)));
        assert!(fresh.expires_within(Duration::days(60)));

        let soon = TokenRecord::new(TokenKind::User, "u2", "tok")
            .with_expiry(Some(Utc::now() + Duration::hours(5)));
        assert!(!soon.is_expired());
        assert!(soon.expires_within(Duration::hours(24)));

        let never = TokenRecord::new(TokenKind::Page, "p1", "tok");
        assert!(!never.is_expired());
        assert!(!never.expires_within(Duration::days(365)));
    }

    #[test]
    fn scopes_are_sorted_and_deduplicated() {
        let record = TokenRecord::new(TokenKind::User, "u1", "tok").with_scopes(vec![
            "pages_show_list".to_string(),
            "ads_read".to_string(),
            "pages_show_list".to_string(),
        ]);
        assert_eq!(record.scopes, vec!["ads_read", "pages_show_list"]);
    }

    #[test]
    fn kind_parse_roundtrip() {
        for kind in TokenKind::ALL {
            assert_eq!(TokenKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(TokenKind::parse("app"), None);
    }
}
