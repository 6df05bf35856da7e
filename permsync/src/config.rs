//! Demo configuration
//!
//! Loaded from JSON. Without a file the built-in profile is used: a device on
//! which camera access is already granted, microphone access was denied once
//! (so it gets a rationale), and fine location was never asked for.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use permsync_host::permission::{
    DeviceProfile, ExplanationCatalog, PermissionId, ReconcilerConfig, RequestCode,
    DEFAULT_RATIONALE_TITLE,
};

pub const APP_NAME: &str = "permsync";

const CAMERA: &str = "android.permission.CAMERA";
const RECORD_AUDIO: &str = "android.permission.RECORD_AUDIO";
const FINE_LOCATION: &str = "android.permission.ACCESS_FINE_LOCATION";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Key for saved session state
    pub app_name: String,
    pub request_code: RequestCode,
    pub rationale_title: String,
    pub explanations: ExplanationCatalog,
    pub device: DeviceProfile,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            request_code: RequestCode::DEFAULT,
            rationale_title: DEFAULT_RATIONALE_TITLE.to_string(),
            explanations: ExplanationCatalog::new()
                .with_entry(
                    "camera_explanation",
                    "Camera access is used to take profile pictures.",
                )
                .with_entry(
                    "record_audio_explanation",
                    "Microphone access is used to record voice notes.",
                ),
            device: DeviceProfile {
                declared: vec![CAMERA.into(), RECORD_AUDIO.into(), FINE_LOCATION.into()],
                granted: BTreeSet::from([PermissionId::new(CAMERA)]),
                rationale: BTreeSet::from([PermissionId::new(RECORD_AUDIO)]),
                answers: HashMap::from([(PermissionId::new(FINE_LOCATION), false)]),
                default_answer: true,
                metadata_missing: false,
            },
        }
    }
}

impl DemoConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// `<config_dir>/permsync/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.json"))
    }

    /// Explicit path, else the default path if it exists, else built-in
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(path),
            _ => {
                tracing::debug!("No config file; using built-in demo profile");
                Ok(Self::default())
            }
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            request_code: self.request_code,
            rationale_title: self.rationale_title.clone(),
            catalog: self.explanations.clone(),
        }
    }
}
