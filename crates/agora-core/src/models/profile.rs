use serde::Deserialize;

use crate::constants::{DEFAULT_DISPLAY_NAME, PLACEHOLDER_AVATAR_URL};

/// Kind-0 profile metadata. Every field is optional on the wire; callers go
/// through the fallback accessors instead of reading fields directly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub picture: Option<String>,
    pub about: Option<String>,
    /// NIP-05 verified address
    pub nip05: Option<String>,
    /// Lightning address for zaps
    pub lud16: Option<String>,
}

impl Profile {
    /// Parse a kind-0 event's content. Malformed JSON yields `None`; callers
    /// fall back to defaults rather than failing.
    pub fn from_metadata_json(content: &str) -> Option<Self> {
        serde_json::from_str(content).ok()
    }

    /// display_name, then name, then "Anonymous".
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(DEFAULT_DISPLAY_NAME)
    }

    /// Profile picture, or a placeholder keyed by pubkey so the fallback is
    /// stable per user.
    pub fn avatar_url(&self, pubkey_hex: &str) -> String {
        self.picture
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| placeholder_avatar(pubkey_hex))
    }
}

pub fn placeholder_avatar(pubkey_hex: &str) -> String {
    format!("{}/{}", PLACEHOLDER_AVATAR_URL, pubkey_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_fallback_chain() {
        let mut p = Profile::default();
        assert_eq!(p.display_name(), "Anonymous");

        p.name = Some("alice".to_string());
        assert_eq!(p.display_name(), "alice");

        p.display_name = Some("Alice".to_string());
        assert_eq!(p.display_name(), "Alice");

        p.display_name = Some(String::new());
        assert_eq!(p.display_name(), "alice");
    }

    #[test]
    fn test_avatar_placeholder_keyed_by_pubkey() {
        let p = Profile::default();
        let url = p.avatar_url("abc123");
        assert!(url.ends_with("/abc123"));
    }

    #[test]
    fn test_malformed_metadata_is_none() {
        assert!(Profile::from_metadata_json("not json").is_none());
        assert!(Profile::from_metadata_json(r#"{"name":"bob"}"#).is_some());
    }
}
