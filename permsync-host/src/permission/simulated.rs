//! In-memory host for demos and tests
//!
//! Models the host authorization state from a [`DeviceProfile`] and answers
//! requests with scripted user responses.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Mutex, PoisonError, RwLock};

use super::host::{HostError, PermissionHost, RequestToken};
use super::id::{GrantResult, PermissionId};
use crate::runtime::{EventSender, HostEvent};

/// Authorization state and scripted user behaviour of a simulated device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceProfile {
    /// Permissions the application declares, in declaration order
    pub declared: Vec<PermissionId>,
    /// Permissions the host already authorizes
    pub granted: BTreeSet<PermissionId>,
    /// Permissions the host wants explained before asking again
    pub rationale: BTreeSet<PermissionId>,
    /// Scripted user answer per permission
    pub answers: HashMap<PermissionId, bool>,
    /// Answer for permissions with no scripted entry
    pub default_answer: bool,
    /// Simulates unreadable application metadata
    pub metadata_missing: bool,
}

impl DeviceProfile {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn answer_for(&self, permission: &PermissionId) -> bool {
        self.answers
            .get(permission)
            .copied()
            .unwrap_or(self.default_answer)
    }
}

/// A request the simulated host received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub token: RequestToken,
    pub permissions: Vec<PermissionId>,
}

/// Host backed by a [`DeviceProfile`]
pub struct SimulatedHost {
    profile: RwLock<DeviceProfile>,
    requests: Mutex<Vec<RecordedRequest>>,
    events: Option<EventSender>,
}

impl SimulatedHost {
    /// Host that only records requests; results must be delivered by hand
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile: RwLock::new(profile),
            requests: Mutex::new(Vec::new()),
            events: None,
        }
    }

    /// Host that answers each request by posting a result event
    pub fn with_events(profile: DeviceProfile, events: EventSender) -> Self {
        Self {
            events: Some(events),
            ..Self::new(profile)
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Snapshot of the simulated device state
    pub fn profile(&self) -> DeviceProfile {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply the scripted answers to the device state and return the results
    fn answer(&self, permissions: &[PermissionId]) -> Vec<GrantResult> {
        let mut profile = self.profile.write().unwrap_or_else(PoisonError::into_inner);
        permissions
            .iter()
            .map(|permission| {
                let granted = profile.answer_for(permission);
                if granted {
                    profile.granted.insert(permission.clone());
                    profile.rationale.remove(permission);
                } else {
                    profile.granted.remove(permission);
                    // A denial makes the platform ask for an explanation next time.
                    profile.rationale.insert(permission.clone());
                }
                GrantResult::from(granted)
            })
            .collect()
    }
}

impl PermissionHost for SimulatedHost {
    fn declared_permissions(&self) -> Result<Vec<PermissionId>, HostError> {
        let profile = self.profile.read().unwrap_or_else(PoisonError::into_inner);
        if profile.metadata_missing {
            return Err(HostError::MetadataUnavailable(
                "application metadata not found".into(),
            ));
        }
        Ok(profile.declared.clone())
    }

    fn is_granted(&self, permission: &PermissionId) -> bool {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .granted
            .contains(permission)
    }

    fn should_show_rationale(&self, permission: &PermissionId) -> bool {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rationale
            .contains(permission)
    }

    fn request_permissions(&self, token: RequestToken, permissions: &[PermissionId]) {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                token,
                permissions: permissions.to_vec(),
            });

        let Some(events) = &self.events else {
            return;
        };
        let results = self.answer(permissions);
        let event = HostEvent::PermissionsResult {
            token,
            permissions: permissions.to_vec(),
            results,
        };
        if events.send(event).is_err() {
            tracing::warn!(
                session = %token.session,
                "Event loop closed; dropping permission result"
            );
        }
    }
}

impl fmt::Debug for SimulatedHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedHost")
            .field("requests", &self.request_count())
            .field("answers_events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}
