use crate::error::BatchError;
use crate::types::{Placement, Size};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_LABEL_PREFIX: &str = "Certificate";
pub const DEFAULT_FOLDER_NAME: &str = "Certificates";
pub const DEFAULT_FONT_PATH: &str = "Amiri-Bold.ttf";

/// Who may open the resolved folder once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessPolicy {
    #[default]
    None,
    /// Grant one address writer access.
    ShareWith { address: String },
    /// Anyone holding the link may read.
    AnyoneReader,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base: String,
    pub upload_base: String,
    pub access_token_env: String,
    pub token_file: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            access_token_env: "DRIVE_ACCESS_TOKEN".to_string(),
            token_file: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub folder_name: String,
    pub label_prefix: String,
    pub font_path: PathBuf,
    pub placement: Placement,
    /// Page size for raster templates; PDF templates keep their own.
    pub raster_page: Size,
    pub access: AccessPolicy,
    /// Emit a progress tick every N records (the last record always ticks).
    pub progress_every: usize,
    pub drive: DriveConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            folder_name: DEFAULT_FOLDER_NAME.to_string(),
            label_prefix: DEFAULT_LABEL_PREFIX.to_string(),
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            placement: Placement::default(),
            raster_page: Size::a4_landscape(),
            access: AccessPolicy::None,
            progress_every: 1,
            drive: DriveConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, BatchError> {
        let config: BatchConfig = toml::from_str(raw)
            .map_err(|err| BatchError::configuration(format!("config parse failed: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            BatchError::configuration(format!("config {} unreadable: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.folder_name.trim().is_empty() {
            return Err(BatchError::configuration("folder name must not be blank"));
        }
        if !self.placement.font_size_in_range() {
            return Err(BatchError::configuration(format!(
                "font size {} outside [{}, {}]",
                self.placement.font_size,
                Placement::MIN_FONT_SIZE,
                Placement::MAX_FONT_SIZE
            )));
        }
        if !self.placement.x.is_finite() || !self.placement.y.is_finite() {
            return Err(BatchError::configuration("placement coordinates must be finite"));
        }
        if !self.raster_page.is_positive() {
            return Err(BatchError::configuration("raster page size must be positive"));
        }
        if self.progress_every == 0 {
            return Err(BatchError::configuration("progress_every must be at least 1"));
        }
        if let AccessPolicy::ShareWith { address } = &self.access {
            if address.trim().is_empty() {
                return Err(BatchError::configuration("share_with address must not be blank"));
            }
        }
        Ok(())
    }

    /// `"<prefix> <name>.pdf"`, using the raw display name.
    pub fn artifact_file_name(&self, display_name: &str) -> String {
        if self.label_prefix.is_empty() {
            format!("{display_name}.pdf")
        } else {
            format!("{} {}.pdf", self.label_prefix, display_name)
        }
    }
}
