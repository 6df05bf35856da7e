//! Runtime permission reconciliation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                             Reconciler                               │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ │
//! │  │    Host      │ │    Store     │ │  Rationale   │ │    Audit     │ │
//! │  │              │ │              │ │              │ │              │ │
//! │  │ - Simulated  │ │ - State      │ │ - Terminal   │ │ - File       │ │
//! │  │ - (platform) │ │   (observ-   │ │ - AutoAck    │ │ - Memory     │ │
//! │  │              │ │    able)     │ │ - Recording  │ │ - Null       │ │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘ │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Flow
//!
//! 1. [`Reconciler::check_once`] sets the session flag, classifies the
//!    declared permissions and publishes the granted ones.
//! 2. If any ungranted permission wants an explanation, a
//!    [`RationaleRequest`] is presented; the host request waits for
//!    [`Reconciler::acknowledge_rationale`].
//! 3. Otherwise ungranted permissions are requested directly.
//! 4. The host answer reaches [`Reconciler::on_permissions_result`], which
//!    folds it into the [`PermissionStateStore`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use permsync_host::permission::{
//!     DeviceProfile, PermissionStateStore, Reconciler, RecordingRationalePresenter,
//!     SimulatedHost,
//! };
//!
//! let store = Arc::new(PermissionStateStore::new());
//! let host = Arc::new(SimulatedHost::new(DeviceProfile {
//!     declared: vec!["android.permission.CAMERA".into()],
//!     ..Default::default()
//! }));
//! let presenter = Arc::new(RecordingRationalePresenter::new());
//!
//! let mut reconciler = Reconciler::new(store, host.clone(), presenter);
//! let session = reconciler.open_session(None);
//! reconciler.check_once(session).unwrap();
//!
//! assert_eq!(host.request_count(), 1);
//! ```

pub mod host;
pub mod id;
pub mod rationale;
pub mod reconcile;
pub mod simulated;
pub mod store;

// Re-exports for convenience
pub use host::{HostError, PermissionHost, RequestToken};
pub use id::{permission_set, GrantResult, PermissionId, PermissionSet, RequestCode};
pub use rationale::{AutoAckPresenter, RecordingRationalePresenter, TerminalRationalePresenter};
pub use rationale::{
    ExplanationCatalog, PresentError, RationaleError, RationalePresenter, RationaleRequest,
    DEFAULT_RATIONALE_TITLE,
};
pub use reconcile::{
    classify, Classification, FollowUp, ReconcileError, Reconciler, ReconcilerConfig,
};
pub use simulated::{DeviceProfile, RecordedRequest, SimulatedHost};
pub use store::{PermissionStateStore, StoreError, SubscriptionId};
