//! Single-threaded event queue for host callbacks
//!
//! Rationale acknowledgments, host permission results and session teardown
//! all arrive as [`HostEvent`]s on one channel and are applied to the
//! [`Reconciler`] strictly in order.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::permission::{GrantResult, PermissionId, Reconciler, RequestToken};
use crate::session::SessionId;

/// Callback delivered by the host or the UI layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The user dismissed the rationale dialog of a session
    RationaleAcknowledged(SessionId),
    /// The host answered a permission request
    PermissionsResult {
        token: RequestToken,
        permissions: Vec<PermissionId>,
        results: Vec<GrantResult>,
    },
    /// The session went away
    SessionDestroyed(SessionId),
    Shutdown,
}

pub type EventSender = mpsc::UnboundedSender<HostEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<HostEvent>;

/// Create the event channel
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Whether the loop keeps running after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Drains [`HostEvent`]s into a [`Reconciler`]
#[derive(Debug)]
pub struct EventLoop {
    events: EventReceiver,
}

impl EventLoop {
    pub fn new(events: EventReceiver) -> Self {
        Self { events }
    }

    /// Apply one event. Failures are logged; stale events are expected.
    pub fn dispatch(reconciler: &mut Reconciler, event: HostEvent) -> Flow {
        match event {
            HostEvent::RationaleAcknowledged(session) => {
                if let Err(e) = reconciler.acknowledge_rationale(session) {
                    tracing::warn!(%session, error = %e, "Rationale acknowledgment not applied");
                }
            }
            HostEvent::PermissionsResult {
                token,
                permissions,
                results,
            } => {
                if let Err(e) = reconciler.on_permissions_result(token, &permissions, &results) {
                    tracing::warn!(
                        session = %token.session,
                        error = %e,
                        "Permission result rejected"
                    );
                }
            }
            HostEvent::SessionDestroyed(session) => {
                reconciler.close_session(session);
            }
            HostEvent::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Process events until shutdown, channel close, or until no session is
    /// waiting on an acknowledgment or a host result.
    ///
    /// Returns the number of events processed.
    pub async fn run(&mut self, reconciler: &mut Reconciler) -> usize {
        let mut processed = 0;
        loop {
            let event = match self.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {
                    if !reconciler.has_pending() {
                        break;
                    }
                    match self.events.recv().await {
                        Some(event) => event,
                        None => break,
                    }
                }
            };

            processed += 1;
            tracing::trace!(?event, "Dispatching host event");
            if Self::dispatch(reconciler, event) == Flow::Stop {
                break;
            }
        }
        processed
    }
}
