//! URL identity.
//!
//! Every URL is addressed by a content hash of its exact string form. The
//! hash is the primary key of the `urls` table, the foreign key of visits
//! and index metadata, and the external document id in the search index,
//! so a search hit maps straight back to a stored record.

use std::fmt;

use sha2::{Digest, Sha256};

/// Length of a [`UrlId`] in hex characters.
pub const URL_ID_LEN: usize = 64;

/// Stable, content-derived identifier of a URL (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct UrlId(String);

impl UrlId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rebuild an id read back from storage. Returns `None` if the value
    /// is not a well-formed id.
    pub fn from_stored(value: String) -> Option<Self> {
        let well_formed =
            value.len() == URL_ID_LEN && value.bytes().all(|b| b.is_ascii_hexdigit());
        well_formed.then_some(Self(value))
    }

    /// Positive 60-bit integer derived from the id, used as the row id of
    /// the document in the full-text index.
    pub fn row_id(&self) -> i64 {
        // 15 hex digits always fit in a positive i64.
        i64::from_str_radix(&self.0[..15], 16).unwrap_or_default()
    }
}

impl fmt::Display for UrlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the identifier of a URL. Pure and deterministic.
pub fn identify(url: &str) -> UrlId {
    UrlId(hex::encode(Sha256::digest(url.as_bytes())))
}

/// Returns the URL if it is worth storing. Browsers occasionally record
/// rows with an empty URL; those carry no identity and are dropped.
pub fn validate(url: &str) -> Option<&str> {
    if url.trim().is_empty() {
        None
    } else {
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identify_is_deterministic() {
        let a = identify("https://example.com");
        let b = identify("https://example.com");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), URL_ID_LEN);
    }

    #[test]
    fn different_urls_have_different_ids() {
        assert_ne!(
            identify("https://example.com"),
            identify("https://example.com/")
        );
        assert_ne!(identify("http://a.test"), identify("https://a.test"));
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            identify("").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn row_id_is_positive_and_stable() {
        let id = identify("https://example.com");
        assert!(id.row_id() > 0);
        assert_eq!(id.row_id(), identify("https://example.com").row_id());
    }

    #[test]
    fn from_stored_rejects_garbage() {
        assert!(UrlId::from_stored("abc".into()).is_none());
        let id = identify("https://example.com");
        assert_eq!(UrlId::from_stored(id.as_str().to_string()), Some(id));
    }

    #[test]
    fn validate_drops_blank_urls() {
        assert_eq!(validate("  "), None);
        assert_eq!(validate("about:blank"), Some("about:blank"));
    }
}
