//! Permission identifiers and the granted-permission set

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Suffix appended to a lower-cased short name to form an explanation key
pub const EXPLANATION_KEY_SUFFIX: &str = "_explanation";

/// Delimiter between namespace segments of a permission identifier
pub const PERMISSION_DELIMITER: char = '.';

/// Opaque, namespaced identifier of a single host capability
/// (e.g. `android.permission.CAMERA`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionId(String);

impl PermissionId {
    /// Create a permission identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Full identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last dot-delimited segment (`CAMERA` for `android.permission.CAMERA`).
    /// Trailing empty segments are skipped.
    pub fn short_name(&self) -> &str {
        self.0
            .rsplit(PERMISSION_DELIMITER)
            .find(|segment| !segment.is_empty())
            .unwrap_or("")
    }

    /// Key used to look up a human-readable explanation
    /// (`camera_explanation` for `android.permission.CAMERA`)
    pub fn explanation_key(&self) -> String {
        format!("{}{}", self.short_name().to_lowercase(), EXPLANATION_KEY_SUFFIX)
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PermissionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PermissionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for PermissionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PermissionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Set of currently granted permissions
pub type PermissionSet = BTreeSet<PermissionId>;

/// Host answer for a single requested permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantResult {
    Granted,
    Denied,
}

impl GrantResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl From<bool> for GrantResult {
    fn from(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }
}

/// Code attached to a permission request so its result can be routed back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestCode(pub i32);

impl RequestCode {
    pub const DEFAULT: RequestCode = RequestCode(999);
}

impl Default for RequestCode {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Build a set from anything yielding permission identifiers
pub fn permission_set<I, P>(ids: I) -> PermissionSet
where
    I: IntoIterator<Item = P>,
    P: Into<PermissionId>,
{
    ids.into_iter().map(Into::into).collect()
}
