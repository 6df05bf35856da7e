//! Wiring of the demo: simulated host, terminal rationale, persisted session

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use permsync_host::audit::{
    AuditEventType, AuditSink, CompositeAuditSink, FileAuditSink, MemoryAuditSink,
};
use permsync_host::permission::{
    AutoAckPresenter, PermissionSet, PermissionStateStore, RationalePresenter, ReconcileError,
    Reconciler, SimulatedHost, TerminalRationalePresenter,
};
use permsync_host::runtime::{self, EventLoop};
use permsync_host::session::{FileSessionStateStore, SessionStateStore};

use crate::cli::RunArgs;
use crate::config::DemoConfig;

/// Render the granted list the way the demo screen shows it
pub fn render_permissions(set: &PermissionSet) -> String {
    let mut out = format!("Granted permissions ({}):\n", set.len());
    if set.is_empty() {
        out.push_str("  (none)\n");
    }
    for permission in set {
        out.push_str(&format!("  - {}\n", permission));
    }
    out
}

fn print_permissions(set: &PermissionSet) {
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = write!(stdout, "{}", render_permissions(set)).and_then(|_| stdout.flush()) {
        tracing::debug!(error = %e, "Failed to print permission list");
    }
}

/// Event counts of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditSummary {
    pub requested: usize,
    pub granted: usize,
    pub denied: usize,
    pub ignored: usize,
}

impl AuditSummary {
    pub fn from_sink(sink: &MemoryAuditSink) -> Self {
        let count = |event_type| sink.find_by_type(event_type).len();
        Self {
            requested: count(AuditEventType::PermissionsRequested),
            granted: count(AuditEventType::PermissionGranted),
            denied: count(AuditEventType::PermissionDenied),
            ignored: count(AuditEventType::ResultIgnored),
        }
    }
}

/// The run's audit sink: `memory`, plus a JSONL file when `audit_log` is set
pub fn open_audit_sink(
    audit_log: Option<&Path>,
    memory: Arc<MemoryAuditSink>,
) -> Result<Arc<dyn AuditSink>> {
    let mut sink = CompositeAuditSink::new().with_sink(memory);
    if let Some(path) = audit_log {
        let file = FileAuditSink::new(path)
            .with_context(|| format!("Failed to open audit log {}", path.display()))?;
        sink = sink.with_sink(file);
    }
    anyhow::ensure!(sink.is_healthy(), "Audit sink is not healthy");
    Ok(Arc::new(sink))
}

pub fn open_state_store(path: Option<&Path>, app_name: &str) -> Result<FileSessionStateStore> {
    match path {
        Some(path) => FileSessionStateStore::new(path),
        None => FileSessionStateStore::default_for_app(app_name),
    }
    .context("Failed to open session state")
}

/// One session: check once, wait for the host, save the session flag
pub async fn run(
    config: DemoConfig,
    args: &RunArgs,
    state_file: Option<&Path>,
    audit_log: Option<&Path>,
) -> Result<()> {
    let state = open_state_store(state_file, &config.app_name)?;

    let events = Arc::new(MemoryAuditSink::new());
    let audit = open_audit_sink(audit_log, events.clone())?;

    let (tx, rx) = runtime::channel();
    let store = Arc::new(PermissionStateStore::new());
    store.observe(print_permissions);

    let host = Arc::new(SimulatedHost::with_events(config.device.clone(), tx.clone()));
    let presenter: Arc<dyn RationalePresenter> = if args.auto_ack {
        Arc::new(AutoAckPresenter::new(tx))
    } else {
        Arc::new(TerminalRationalePresenter::new(tx))
    };

    let mut reconciler = Reconciler::new(store, host, presenter)
        .with_audit(audit.clone())
        .with_config(config.reconciler_config());

    let saved = if args.restore {
        state.load(&config.app_name)?
    } else {
        None
    };
    let session = reconciler.open_session(saved);

    match reconciler.check_once(session) {
        Ok(Some(classification)) => tracing::debug!(?classification, "Check ran"),
        Ok(None) => tracing::info!("Permissions already checked in this session"),
        Err(ReconcileError::Host(e)) => {
            tracing::warn!(error = %e, "Permission check unavailable; showing current state");
        }
        Err(e) => return Err(e).context("Permission check failed"),
    }

    let processed = EventLoop::new(rx).run(&mut reconciler).await;
    tracing::debug!(processed, "Event loop finished");

    if let Some(saved) = reconciler.close_session(session) {
        state.save(&config.app_name, saved)?;
    }
    audit.flush().context("Failed to flush audit log")?;

    let summary = AuditSummary::from_sink(&events);
    tracing::info!(
        requested = summary.requested,
        granted = summary.granted,
        denied = summary.denied,
        ignored = summary.ignored,
        "Run finished"
    );
    Ok(())
}

/// Print the saved session flag
pub fn status(state: &dyn SessionStateStore, app_name: &str) -> Result<String> {
    let line = match state.load(app_name)? {
        Some(saved) if saved.checked => format!("{}: permissions checked", app_name),
        Some(_) => format!("{}: permissions not checked", app_name),
        None => format!("{}: no saved session", app_name),
    };
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_host::audit::{AuditDetails, AuditEvent};
    use permsync_host::permission::{permission_set, PermissionId};
    use permsync_host::session::{MemorySessionStateStore, SavedSession};

    #[test]
    fn test_render_permissions() {
        let rendered = render_permissions(&permission_set(["b.CAMERA", "a.AUDIO"]));
        assert_eq!(
            rendered,
            "Granted permissions (2):\n  - a.AUDIO\n  - b.CAMERA\n"
        );
        assert!(render_permissions(&PermissionSet::new()).contains("(none)"));
    }

    #[test]
    fn test_status_lines() {
        let state = MemorySessionStateStore::new();
        assert_eq!(status(&state, "demo").unwrap(), "demo: no saved session");

        state.save("demo", SavedSession { checked: true }).unwrap();
        assert_eq!(status(&state, "demo").unwrap(), "demo: permissions checked");
    }

    #[test]
    fn test_audit_sink_fans_out_to_file_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit").join("run.jsonl");
        let memory = Arc::new(MemoryAuditSink::new());

        let sink = open_audit_sink(Some(path.as_path()), memory.clone()).unwrap();
        sink.record(AuditEvent::new(
            AuditEventType::PermissionGranted,
            AuditDetails::Grant {
                permission: PermissionId::new("a.CAMERA"),
            },
        ))
        .unwrap();
        sink.flush().unwrap();

        assert_eq!(memory.count(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
        assert_eq!(
            AuditSummary::from_sink(&memory),
            AuditSummary {
                granted: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_audit_sink_without_file_is_memory_only() {
        let memory = Arc::new(MemoryAuditSink::new());
        let sink = open_audit_sink(None, memory.clone()).unwrap();
        assert!(sink.is_healthy());
        assert_eq!(AuditSummary::from_sink(&memory), AuditSummary::default());
    }

    #[tokio::test]
    async fn test_run_persists_flag_and_restore_skips_check() {
        let dir = tempfile::tempdir().unwrap();
        let state_file = dir.path().join("session.json");
        let audit_log = dir.path().join("audit.jsonl");
        let args = RunArgs {
            restore: false,
            auto_ack: true,
        };

        run(DemoConfig::default(), &args, Some(state_file.as_path()), Some(audit_log.as_path()))
            .await
            .unwrap();

        let state = FileSessionStateStore::new(&state_file).unwrap();
        assert_eq!(
            state.load(crate::config::APP_NAME).unwrap(),
            Some(SavedSession { checked: true })
        );
        let first_run = std::fs::read_to_string(&audit_log).unwrap().lines().count();
        assert!(first_run > 0);

        let restore = RunArgs {
            restore: true,
            auto_ack: true,
        };
        run(DemoConfig::default(), &restore, Some(state_file.as_path()), Some(audit_log.as_path()))
            .await
            .unwrap();

        // Restored session skipped the check entirely
        let second_run = std::fs::read_to_string(&audit_log).unwrap().lines().count();
        assert_eq!(first_run, second_run);
    }

    #[tokio::test]
    async fn test_run_survives_missing_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DemoConfig::default();
        config.device.metadata_missing = true;

        run(
            config,
            &RunArgs {
                restore: false,
                auto_ack: true,
            },
            Some(dir.path().join("session.json").as_path()),
            None,
        )
        .await
        .unwrap();
    }
}
