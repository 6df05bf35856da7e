//! permsync-host: runtime permission workflow
//!
//! Keeps an observable set of granted permissions in sync with the host,
//! deciding once per UI session which permissions to request and whether to
//! explain them first.

pub mod audit;
pub mod permission;
pub mod runtime;
pub mod session;

pub use permission::{
    Classification, PermissionHost, PermissionId, PermissionSet, PermissionStateStore,
    Reconciler,
};
pub use runtime::{EventLoop, EventSender, HostEvent};
pub use session::{SavedSession, SessionId};
