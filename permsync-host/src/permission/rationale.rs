//! Rationale text and presentation
//!
//! Before re-requesting permissions the user previously denied, a single
//! dialog explains why they are needed. The explanation of each permission
//! comes from an [`ExplanationCatalog`]; presenting the dialog and collecting
//! the acknowledgment is delegated to a [`RationalePresenter`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use super::host::RequestToken;
use super::id::PermissionId;
use crate::runtime::{EventSender, HostEvent};

/// Default dialog title
pub const DEFAULT_RATIONALE_TITLE: &str = "Permissions required";

/// Separator between explanations in the dialog message
pub const EXPLANATION_SEPARATOR: &str = "\n";

/// Error type for building a rationale request
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RationaleError {
    #[error("Rationale requested with no permissions to explain")]
    NothingToExplain,
}

/// Error type for presenting a rationale
#[derive(Debug, Error)]
pub enum PresentError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Event loop closed before acknowledgment could be delivered")]
    EventLoopClosed,
}

/// Explicit mapping from permissions to human-readable explanations.
///
/// Entries are keyed either by full permission id or by the derived
/// explanation key (`camera_explanation`). Lookups try the full id first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExplanationCatalog {
    entries: HashMap<String, String>,
}

impl ExplanationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry keyed by full id or explanation key
    pub fn with_entry(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(key, text);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.entries.insert(key.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured explanation, if any
    pub fn lookup(&self, permission: &PermissionId) -> Option<&str> {
        self.entries
            .get(permission.as_str())
            .or_else(|| self.entries.get(&permission.explanation_key()))
            .map(String::as_str)
    }

    /// Explanation for `permission`, falling back to its short name
    pub fn explain(&self, permission: &PermissionId) -> String {
        self.lookup(permission)
            .unwrap_or_else(|| permission.short_name())
            .to_string()
    }

    /// One explanation per permission, joined in list order
    pub fn build_message(&self, permissions: &[PermissionId]) -> String {
        permissions
            .iter()
            .map(|p| self.explain(p))
            .collect::<Vec<_>>()
            .join(EXPLANATION_SEPARATOR)
    }
}

impl<K, V> FromIterator<(K, V)> for ExplanationCatalog
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Everything needed to render one rationale dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RationaleRequest {
    pub token: RequestToken,
    pub title: String,
    /// Permissions being explained
    pub explain: Vec<PermissionId>,
    /// Permissions requested once the dialog is acknowledged
    pub to_request: Vec<PermissionId>,
    /// Rendered explanation text
    pub message: String,
}

impl RationaleRequest {
    pub fn new(
        token: RequestToken,
        title: impl Into<String>,
        explain: Vec<PermissionId>,
        to_request: Vec<PermissionId>,
        catalog: &ExplanationCatalog,
    ) -> Result<Self, RationaleError> {
        if explain.is_empty() {
            return Err(RationaleError::NothingToExplain);
        }
        let message = catalog.build_message(&explain);
        Ok(Self {
            token,
            title: title.into(),
            explain,
            to_request,
            message,
        })
    }
}

/// Trait for showing a rationale dialog
///
/// `present` only displays the dialog. The acknowledgment is delivered
/// separately, as [`HostEvent::RationaleAcknowledged`], or by calling
/// [`Reconciler::acknowledge_rationale`](crate::permission::Reconciler::acknowledge_rationale).
pub trait RationalePresenter: Send + Sync {
    fn present(&self, request: &RationaleRequest) -> Result<(), PresentError>;
}

// ============================================================================
// Terminal Presenter
// ============================================================================

/// Prints the dialog to the terminal and waits for Enter before acknowledging
#[derive(Debug)]
pub struct TerminalRationalePresenter {
    events: EventSender,
}

impl TerminalRationalePresenter {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }

    fn render(request: &RationaleRequest) -> String {
        let mut out = String::new();
        out.push_str(&format!("[i] {}\n\n", request.title));
        out.push_str(&request.message);
        out.push('\n');
        out
    }
}

impl RationalePresenter for TerminalRationalePresenter {
    fn present(&self, request: &RationaleRequest) -> Result<(), PresentError> {
        let mut stdout = io::stdout();
        writeln!(stdout)?;
        write!(stdout, "{}", Self::render(request))?;

        // Only button is OK; without a terminal there is nobody to press it.
        if atty_check() {
            write!(stdout, "\nPress Enter to continue... ")?;
            stdout.flush()?;
            let mut input = String::new();
            io::stdin().lock().read_line(&mut input)?;
        } else {
            stdout.flush()?;
        }

        self.events
            .send(HostEvent::RationaleAcknowledged(request.token.session))
            .map_err(|_| PresentError::EventLoopClosed)
    }
}

// ============================================================================
// Auto-Acknowledge Presenter
// ============================================================================

/// Acknowledges every rationale immediately without displaying it
#[derive(Debug)]
pub struct AutoAckPresenter {
    events: EventSender,
}

impl AutoAckPresenter {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

impl RationalePresenter for AutoAckPresenter {
    fn present(&self, request: &RationaleRequest) -> Result<(), PresentError> {
        tracing::debug!(session = %request.token.session, "Auto-acknowledging rationale");
        self.events
            .send(HostEvent::RationaleAcknowledged(request.token.session))
            .map_err(|_| PresentError::EventLoopClosed)
    }
}

// ============================================================================
// Recording Presenter (for testing)
// ============================================================================

/// Records presented rationales and never acknowledges them
#[derive(Debug, Default)]
pub struct RecordingRationalePresenter {
    presented: Mutex<Vec<RationaleRequest>>,
}

impl RecordingRationalePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> Vec<RationaleRequest> {
        self.presented
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.presented
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl RationalePresenter for RecordingRationalePresenter {
    fn present(&self, request: &RationaleRequest) -> Result<(), PresentError> {
        self.presented
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        Ok(())
    }
}

/// Check if stdout is connected to a terminal
fn atty_check() -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: isatty is safe to call with any file descriptor
        unsafe { libc::isatty(std::io::stdout().as_raw_fd()) != 0 }
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use windows_sys::Win32::System::Console::{GetConsoleMode, CONSOLE_MODE};
        let handle = std::io::stdout().as_raw_handle();
        let mut mode: CONSOLE_MODE = 0;
        // SAFETY: GetConsoleMode is safe with valid handle
        unsafe { GetConsoleMode(handle as _, &mut mode) != 0 }
    }

    #[cfg(not(any(unix, windows)))]
    {
        std::env::var("TERM").is_ok()
    }
}
