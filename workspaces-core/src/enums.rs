//! Enum types for workspace resources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// VISIBILITY
// ============================================================================

/// Who can discover a workspace.
///
/// The control plane does not validate this field, so values outside the two
/// known classes are kept verbatim in [`Visibility::Unknown`] instead of being
/// rejected at decode time. The visibility reconciler treats them as a terminal
/// configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Visibility {
    /// Discoverable by every authenticated principal.
    Community,
    /// Discoverable only by principals holding an explicit grant.
    #[default]
    Private,
    /// Anything else found upstream.
    Unknown(String),
}

impl Visibility {
    pub const COMMUNITY: &'static str = "community";
    pub const PRIVATE: &'static str = "private";

    /// Wire representation, also used as the visibility index value.
    pub fn as_str(&self) -> &str {
        match self {
            Visibility::Community => Self::COMMUNITY,
            Visibility::Private => Self::PRIVATE,
            Visibility::Unknown(value) => value,
        }
    }

    pub fn is_community(&self) -> bool {
        matches!(self, Visibility::Community)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Visibility::Unknown(_))
    }
}

impl From<String> for Visibility {
    fn from(value: String) -> Self {
        match value.as_str() {
            Self::COMMUNITY => Visibility::Community,
            Self::PRIVATE => Visibility::Private,
            _ => Visibility::Unknown(value),
        }
    }
}

impl From<&str> for Visibility {
    fn from(value: &str) -> Self {
        Visibility::from(value.to_string())
    }
}

impl From<Visibility> for String {
    fn from(value: Visibility) -> Self {
        match value {
            Visibility::Unknown(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SPACE ROLE
// ============================================================================

/// Role conferred on a principal by an access grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceRole {
    Viewer,
    Contributor,
    Maintainer,
    Admin,
}

impl SpaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceRole::Viewer => "viewer",
            SpaceRole::Contributor => "contributor",
            SpaceRole::Maintainer => "maintainer",
            SpaceRole::Admin => "admin",
        }
    }
}

impl fmt::Display for SpaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceRole {
    type Err = SpaceRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(SpaceRole::Viewer),
            "contributor" => Ok(SpaceRole::Contributor),
            "maintainer" => Ok(SpaceRole::Maintainer),
            "admin" => Ok(SpaceRole::Admin),
            other => Err(SpaceRoleParseError(other.to_string())),
        }
    }
}

/// Error when parsing an invalid space role string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRoleParseError(pub String);

impl fmt::Display for SpaceRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid space role: {}", self.0)
    }
}

impl std::error::Error for SpaceRoleParseError {}

// ============================================================================
// RESOURCE KIND
// ============================================================================

/// Resource kind discriminator used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    InternalWorkspace,
    Workspace,
    AccessGrant,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            ResourceKind::InternalWorkspace => "InternalWorkspace",
            ResourceKind::Workspace => "Workspace",
            ResourceKind::AccessGrant => "AccessGrant",
        };
        write!(f, "{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_known_values() {
        assert_eq!(Visibility::from("community"), Visibility::Community);
        assert_eq!(Visibility::from("private"), Visibility::Private);
        assert!(Visibility::Community.is_community());
        assert!(!Visibility::Private.is_community());
    }

    #[test]
    fn test_visibility_preserves_unknown_value() {
        let visibility = Visibility::from("Community");
        assert_eq!(visibility, Visibility::Unknown("Community".to_string()));
        assert!(!visibility.is_known());
        assert_eq!(visibility.as_str(), "Community");
        assert_eq!(String::from(visibility), "Community");
    }

    #[test]
    fn test_visibility_serde() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Visibility::Community)?, "\"community\"");
        let parsed: Visibility = serde_json::from_str("\"public\"")?;
        assert_eq!(parsed, Visibility::Unknown("public".to_string()));
        assert_eq!(serde_json::to_string(&parsed)?, "\"public\"");
        Ok(())
    }

    #[test]
    fn test_space_role_round_trip() {
        for role in [
            SpaceRole::Viewer,
            SpaceRole::Contributor,
            SpaceRole::Maintainer,
            SpaceRole::Admin,
        ] {
            assert_eq!(role.as_str().parse::<SpaceRole>(), Ok(role));
        }
        assert!("owner".parse::<SpaceRole>().is_err());
    }
}
