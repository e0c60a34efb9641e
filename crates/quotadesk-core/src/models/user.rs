use serde::{Deserialize, Serialize};

/// Fallback label when a user has neither a username nor a usable email.
const DEFAULT_DISPLAY_NAME: &str = "User";

/// The authenticated identity. Extra fields sent by the server are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    #[serde(default)]
    pub id: Option<i64>,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl User {
    /// Name shown in the user menu: the username, else the local part of the
    /// email address, else a generic label.
    pub fn display_name(&self) -> &str {
        if let Some(name) = self.username.as_deref().filter(|n| !n.is_empty()) {
            return name;
        }
        match self.email.split('@').next() {
            Some(local) if !local.is_empty() => local,
            _ => DEFAULT_DISPLAY_NAME,
        }
    }

    /// Avatar initial: first character of the display name, uppercased.
    pub fn initial(&self) -> String {
        self.display_name()
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, username: Option<&str>) -> User {
        User {
            id: Some(1),
            email: email.to_string(),
            username: username.map(str::to_string),
        }
    }

    #[test]
    fn test_display_name_prefers_username() {
        assert_eq!(user("a@x.com", Some("alice")).display_name(), "alice");
    }

    #[test]
    fn test_display_name_falls_back_to_email() {
        assert_eq!(user("bob@x.com", None).display_name(), "bob");
        assert_eq!(user("bob@x.com", Some("")).display_name(), "bob");
    }

    #[test]
    fn test_display_name_default() {
        assert_eq!(user("", None).display_name(), "User");
        assert_eq!(user("@x.com", None).display_name(), "User");
    }

    #[test]
    fn test_initial() {
        assert_eq!(user("carol@x.com", None).initial(), "C");
        assert_eq!(user("a@x.com", Some("élan")).initial(), "É");
    }

    #[test]
    fn test_deserialize_ignores_extra_fields() {
        let json = r#"{"id": 7, "email": "a@x.com", "username": null, "quota_balance": 3, "role": "user"}"#;
        let parsed: User = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, Some(7));
        assert_eq!(parsed.email, "a@x.com");
        assert_eq!(parsed.username, None);
    }

    #[test]
    fn test_deserialize_without_id() {
        let parsed: User = serde_json::from_str(r#"{"email": "a@x.com"}"#).unwrap();
        assert_eq!(parsed.id, None);
    }
}
