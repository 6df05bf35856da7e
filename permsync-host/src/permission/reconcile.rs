//! Permission reconciliation
//!
//! Partitions the declared permissions into granted, request-only and
//! rationale-then-request, publishes the granted part, then drives exactly
//! one follow-up: a rationale dialog (with the host request deferred until it
//! is acknowledged), a direct host request, or nothing.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::host::{HostError, PermissionHost, RequestToken};
use super::id::{GrantResult, PermissionId, PermissionSet, RequestCode};
use super::rationale::{
    ExplanationCatalog, PresentError, RationaleError, RationalePresenter, RationaleRequest,
    DEFAULT_RATIONALE_TITLE,
};
use super::store::{PermissionStateStore, StoreError};
use crate::audit::{AuditDetails, AuditEvent, AuditEventType, AuditSink, NullAuditSink};
use crate::session::{CheckState, SavedSession, Session, SessionId, SessionRegistry};

/// Outcome of one classification pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Already authorized by the host
    pub granted: Vec<PermissionId>,
    /// Not authorized; request directly
    pub request_only: Vec<PermissionId>,
    /// Not authorized; explain before requesting
    pub rationale_then_request: Vec<PermissionId>,
    to_request: Vec<PermissionId>,
}

impl Classification {
    /// Every ungranted permission, in declared order
    pub fn to_request(&self) -> &[PermissionId] {
        &self.to_request
    }

    pub fn is_empty(&self) -> bool {
        self.granted.is_empty() && self.to_request.is_empty()
    }

    /// The single action this classification calls for
    pub fn follow_up(&self) -> FollowUp {
        if !self.rationale_then_request.is_empty() {
            FollowUp::Rationale {
                explain: self.rationale_then_request.clone(),
                request: self.to_request.clone(),
            }
        } else if !self.request_only.is_empty() {
            FollowUp::Request(self.request_only.clone())
        } else {
            FollowUp::Nothing
        }
    }
}

/// Action following a classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Nothing,
    Request(Vec<PermissionId>),
    /// Show a rationale for `explain`, then request `request`
    Rationale {
        explain: Vec<PermissionId>,
        request: Vec<PermissionId>,
    },
}

/// Classify `declared` in one pass, preserving order in every output list
pub fn classify<G, E>(
    declared: &[PermissionId],
    mut is_granted: G,
    mut should_explain: E,
) -> Classification
where
    G: FnMut(&PermissionId) -> bool,
    E: FnMut(&PermissionId) -> bool,
{
    let mut classification = Classification::default();
    for permission in declared {
        if is_granted(permission) {
            classification.granted.push(permission.clone());
            continue;
        }
        if should_explain(permission) {
            classification.rationale_then_request.push(permission.clone());
        } else {
            classification.request_only.push(permission.clone());
        }
        classification.to_request.push(permission.clone());
    }
    classification
}

/// Error type for reconciliation
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rationale(#[from] RationaleError),

    #[error("Failed to present rationale: {0}")]
    Present(#[from] PresentError),

    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),

    #[error("{0} is not waiting for a rationale acknowledgment")]
    NotAwaitingRationale(SessionId),
}

/// Tunables of a [`Reconciler`]
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub request_code: RequestCode,
    pub rationale_title: String,
    pub catalog: ExplanationCatalog,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            request_code: RequestCode::DEFAULT,
            rationale_title: DEFAULT_RATIONALE_TITLE.to_string(),
            catalog: ExplanationCatalog::new(),
        }
    }
}

/// Drives the one-shot permission check of each session
pub struct Reconciler {
    store: Arc<PermissionStateStore>,
    host: Arc<dyn PermissionHost>,
    presenter: Arc<dyn RationalePresenter>,
    audit: Arc<dyn AuditSink>,
    config: ReconcilerConfig,
    sessions: SessionRegistry,
}

impl Reconciler {
    pub fn new(
        store: Arc<PermissionStateStore>,
        host: Arc<dyn PermissionHost>,
        presenter: Arc<dyn RationalePresenter>,
    ) -> Self {
        Self {
            store,
            host,
            presenter,
            audit: Arc::new(NullAuditSink),
            config: ReconcilerConfig::default(),
            sessions: SessionRegistry::new(),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<PermissionStateStore> {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn open_session(&mut self, saved: Option<SavedSession>) -> SessionId {
        let id = self.sessions.open(saved);
        tracing::debug!(session = %id, restored = saved.is_some(), "Session opened");
        id
    }

    pub fn close_session(&mut self, id: SessionId) -> Option<SavedSession> {
        let saved = self.sessions.close(id);
        if saved.is_some() {
            tracing::debug!(session = %id, "Session closed");
        }
        saved
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn has_pending(&self) -> bool {
        self.sessions.has_pending()
    }

    /// Run the permission check of `id` unless it already ran.
    ///
    /// The session flag is set before anything else, so the check runs at
    /// most once per session however long the host takes to answer.
    /// Returns `Ok(None)` when the check already ran.
    pub fn check_once(&mut self, id: SessionId) -> Result<Option<Classification>, ReconcileError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or(ReconcileError::UnknownSession(id))?;
        if !session.begin_check() {
            tracing::debug!(session = %id, "Permissions already checked");
            return Ok(None);
        }

        let declared = match self.host.declared_permissions() {
            Ok(declared) => declared,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "Cannot read declared permissions");
                self.set_state(id, CheckState::Checked);
                self.record(
                    id,
                    AuditEventType::CheckFailed,
                    AuditDetails::Failure {
                        error: e.to_string(),
                    },
                );
                return Err(e.into());
            }
        };

        let host = &self.host;
        let classification = classify(
            &declared,
            |p| host.is_granted(p),
            |p| host.should_show_rationale(p),
        );
        tracing::info!(
            session = %id,
            granted = classification.granted.len(),
            request_only = classification.request_only.len(),
            rationale = classification.rationale_then_request.len(),
            "Classified declared permissions"
        );
        self.record(
            id,
            AuditEventType::PermissionsClassified,
            AuditDetails::Classification {
                granted: classification.granted.clone(),
                request_only: classification.request_only.clone(),
                rationale_then_request: classification.rationale_then_request.clone(),
            },
        );

        self.publish_granted(&declared, &classification.granted);

        let token = RequestToken::new(id, self.config.request_code);
        match classification.follow_up() {
            FollowUp::Nothing => self.set_state(id, CheckState::Checked),
            FollowUp::Request(permissions) => {
                self.set_state(
                    id,
                    CheckState::AwaitingOsResult {
                        requested: permissions.clone(),
                    },
                );
                self.issue_request(token, &permissions);
            }
            FollowUp::Rationale { explain, request } => {
                let rationale = RationaleRequest::new(
                    token,
                    self.config.rationale_title.clone(),
                    explain.clone(),
                    request.clone(),
                    &self.config.catalog,
                )?;
                self.set_state(
                    id,
                    CheckState::AwaitingRationaleAck {
                        to_request: request,
                    },
                );
                if let Err(e) = self.presenter.present(&rationale) {
                    self.set_state(id, CheckState::Checked);
                    return Err(e.into());
                }
                tracing::info!(session = %id, count = explain.len(), "Rationale presented");
                self.record(
                    id,
                    AuditEventType::RationaleShown,
                    AuditDetails::Rationale { explain },
                );
            }
        }

        Ok(Some(classification))
    }

    /// Continue after the rationale dialog of `id` was acknowledged
    pub fn acknowledge_rationale(&mut self, id: SessionId) -> Result<(), ReconcileError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or(ReconcileError::UnknownSession(id))?;
        let to_request = match session.state() {
            CheckState::AwaitingRationaleAck { to_request } => to_request.clone(),
            _ => return Err(ReconcileError::NotAwaitingRationale(id)),
        };
        session.set_state(CheckState::AwaitingOsResult {
            requested: to_request.clone(),
        });

        let token = RequestToken::new(id, self.config.request_code);
        self.issue_request(token, &to_request);
        Ok(())
    }

    /// Apply a host result.
    ///
    /// Returns `Ok(false)` when the result is not ours (foreign request code),
    /// its session no longer exists, or the session is not awaiting a result.
    pub fn on_permissions_result(
        &mut self,
        token: RequestToken,
        permissions: &[PermissionId],
        results: &[GrantResult],
    ) -> Result<bool, ReconcileError> {
        if token.code != self.config.request_code {
            tracing::debug!(code = %token.code, "Ignoring result for foreign request code");
            return Ok(false);
        }
        let awaiting = match self.sessions.get(token.session) {
            None => {
                tracing::debug!(
                    session = %token.session,
                    "Ignoring result for destroyed session"
                );
                self.record_ignored(token.session, "session destroyed");
                return Ok(false);
            }
            Some(session) => matches!(session.state(), CheckState::AwaitingOsResult { .. }),
        };
        if !awaiting {
            tracing::debug!(
                session = %token.session,
                "Ignoring result for session not awaiting one"
            );
            self.record_ignored(token.session, "session not awaiting a result");
            return Ok(false);
        }

        self.store.apply_grant_result(permissions, results)?;

        for (permission, result) in permissions.iter().zip(results) {
            let event_type = if result.is_granted() {
                AuditEventType::PermissionGranted
            } else {
                AuditEventType::PermissionDenied
            };
            self.record(
                token.session,
                event_type,
                AuditDetails::Grant {
                    permission: permission.clone(),
                },
            );
        }
        tracing::info!(
            session = %token.session,
            granted = results.iter().filter(|r| r.is_granted()).count(),
            denied = results.iter().filter(|r| !r.is_granted()).count(),
            "Applied permission result"
        );

        self.set_state(token.session, CheckState::Checked);
        Ok(true)
    }

    /// Publish `(current - declared) + granted`
    fn publish_granted(&self, declared: &[PermissionId], granted: &[PermissionId]) {
        let declared: BTreeSet<&PermissionId> = declared.iter().collect();
        let mut next: PermissionSet = self
            .store
            .current()
            .iter()
            .filter(|p| !declared.contains(p))
            .cloned()
            .collect();
        next.extend(granted.iter().cloned());
        self.store.replace(next);
    }

    fn issue_request(&self, token: RequestToken, permissions: &[PermissionId]) {
        tracing::info!(
            session = %token.session,
            code = %token.code,
            count = permissions.len(),
            "Requesting permissions"
        );
        self.record(
            token.session,
            AuditEventType::PermissionsRequested,
            AuditDetails::Request {
                permissions: permissions.to_vec(),
                request_code: token.code,
            },
        );
        self.host.request_permissions(token, permissions);
    }

    fn set_state(&mut self, id: SessionId, state: CheckState) {
        if let Some(session) = self.sessions.get_mut(id) {
            session.set_state(state);
        }
    }

    fn record_ignored(&self, session: SessionId, reason: &str) {
        self.record(
            session,
            AuditEventType::ResultIgnored,
            AuditDetails::Ignored {
                reason: reason.to_string(),
            },
        );
    }

    fn record(&self, session: SessionId, event_type: AuditEventType, details: AuditDetails) {
        let event = AuditEvent::new(event_type, details).with_session(session);
        if let Err(e) = self.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<PermissionId> {
        names.iter().map(|n| PermissionId::new(*n)).collect()
    }

    #[test]
    fn test_classify_partitions_in_order() {
        let declared = ids(&["a", "b", "c", "d", "e"]);
        let granted = ["b", "e"];
        let explain = ["c"];

        let c = classify(
            &declared,
            |p| granted.contains(&p.as_str()),
            |p| explain.contains(&p.as_str()),
        );

        assert_eq!(c.granted, ids(&["b", "e"]));
        assert_eq!(c.request_only, ids(&["a", "d"]));
        assert_eq!(c.rationale_then_request, ids(&["c"]));
        assert_eq!(c.to_request(), ids(&["a", "c", "d"]).as_slice());

        let total = c.granted.len() + c.request_only.len() + c.rationale_then_request.len();
        assert_eq!(total, declared.len());
    }

    #[test]
    fn test_classify_does_not_ask_about_granted() {
        let declared = ids(&["cam", "mic"]);
        let mut asked = Vec::new();

        classify(
            &declared,
            |p| p.as_str() == "cam",
            |p| {
                asked.push(p.clone());
                false
            },
        );

        assert_eq!(asked, ids(&["mic"]));
    }

    #[test]
    fn test_empty_declared_list() {
        let c = classify(&[], |_| true, |_| true);
        assert!(c.is_empty());
        assert_eq!(c.follow_up(), FollowUp::Nothing);
    }

    #[test]
    fn test_follow_up_selection() {
        let direct = classify(&ids(&["cam", "mic"]), |p| p.as_str() == "cam", |_| false);
        assert_eq!(direct.follow_up(), FollowUp::Request(ids(&["mic"])));

        let explained = classify(&ids(&["cam", "mic"]), |_| false, |p| p.as_str() == "mic");
        assert_eq!(
            explained.follow_up(),
            FollowUp::Rationale {
                explain: ids(&["mic"]),
                request: ids(&["cam", "mic"]),
            }
        );

        let settled = classify(&ids(&["cam"]), |_| true, |_| false);
        assert_eq!(settled.follow_up(), FollowUp::Nothing);
    }
}
