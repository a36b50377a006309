use serde::{Deserialize, Serialize};
use std::fmt;

/// Short random id used to tell concurrent shell instances apart in logs.
pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    let bytes = uuid.as_bytes();
    format!(
        "{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3]
    )
}

/// Whether `segment` can be used as a single directory name under the
/// bundle root without escaping it.
fn is_path_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
}

macro_rules! bundle_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the id is usable as a bundle directory name.
            pub fn is_path_safe(&self) -> bool {
                is_path_segment(&self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

bundle_id!(
    /// Identifier of a mini-app.
    AppId
);

bundle_id!(
    /// Identifier of one published version of a mini-app bundle.
    VersionId
);

/// Caller-supplied id of a bridge message.
///
/// Opaque and untrusted: it comes straight from page script. Uniqueness is
/// the page's responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_short_hex() {
        let cid = new_correlation_id();
        assert_eq!(cid.len(), 8);
        assert!(cid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn correlation_id_is_unique() {
        assert_ne!(new_correlation_id(), new_correlation_id());
    }

    #[test]
    fn plain_ids_are_path_safe() {
        assert!(AppId::new("com.example.shop").is_path_safe());
        assert!(VersionId::new("v1.2.3-build_7").is_path_safe());
    }

    #[test]
    fn traversal_ids_are_not_path_safe() {
        assert!(!AppId::new("").is_path_safe());
        assert!(!AppId::new("..").is_path_safe());
        assert!(!AppId::new(".").is_path_safe());
        assert!(!VersionId::new("../etc").is_path_safe());
        assert!(!VersionId::new("a/b").is_path_safe());
        assert!(!VersionId::new("a\\b").is_path_safe());
        assert!(!VersionId::new("nul\0byte").is_path_safe());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = VersionId::new("v7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"v7\"");
        let parsed: MessageId = serde_json::from_str("\"msg-1\"").unwrap();
        assert_eq!(parsed.as_str(), "msg-1");
    }

    #[test]
    fn display_matches_inner() {
        assert_eq!(AppId::new("app").to_string(), "app");
        assert_eq!(MessageId::new("m'1").to_string(), "m'1");
    }
}
