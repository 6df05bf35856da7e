//! Host permission subsystem abstraction
//!
//! The host owns the real authorization state. This crate only asks it
//! questions and fires requests; results come back later as
//! [`HostEvent::PermissionsResult`](crate::runtime::HostEvent).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::{PermissionId, RequestCode};
use crate::session::SessionId;

/// Error type for host queries
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Declared permissions unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Failed to read host metadata: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse host metadata: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Identifies an in-flight request so its result can be routed back to the
/// session that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken {
    pub session: SessionId,
    pub code: RequestCode,
}

impl RequestToken {
    pub fn new(session: SessionId, code: RequestCode) -> Self {
        Self { session, code }
    }
}

/// Trait for the host permission subsystem
///
/// # Example
///
/// ```rust
/// use permsync_host::permission::{HostError, PermissionHost, PermissionId, RequestToken};
///
/// struct NothingGranted;
///
/// impl PermissionHost for NothingGranted {
///     fn declared_permissions(&self) -> Result<Vec<PermissionId>, HostError> {
///         Ok(vec![PermissionId::new("android.permission.CAMERA")])
///     }
///
///     fn is_granted(&self, _permission: &PermissionId) -> bool {
///         false
///     }
///
///     fn should_show_rationale(&self, _permission: &PermissionId) -> bool {
///         false
///     }
///
///     fn request_permissions(&self, _token: RequestToken, _permissions: &[PermissionId]) {
///         // Hand off to the platform; the answer arrives as an event.
///     }
/// }
/// ```
pub trait PermissionHost: Send + Sync {
    /// Every permission the running application declares
    fn declared_permissions(&self) -> Result<Vec<PermissionId>, HostError>;

    /// Whether the host currently authorizes `permission`
    fn is_granted(&self, permission: &PermissionId) -> bool;

    /// Whether the platform recommends explaining `permission` before asking
    fn should_show_rationale(&self, permission: &PermissionId) -> bool;

    /// Ask the host to prompt for `permissions`. Fire and forget.
    fn request_permissions(&self, token: RequestToken, permissions: &[PermissionId]);
}
