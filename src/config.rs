//! Run configuration, read from a JSON file.
//!
//! ```json
//! {
//!   "source_file": "addresses.tsv",
//!   "font_file": "fonts/ipaexm.ttf",
//!   "year": 2026,
//!   "sender": { "family_name": "鈴木", "given_name": "花子",
//!               "postal_code": "160-0022", "address1": "東京都新宿区2-2" }
//! }
//! ```

use crate::error::HagakiError;
use crate::layout_spec::LayoutSpec;
use crate::model::SenderProfile;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_OUTPUT_FILE: &str = "nenga.pdf";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address book: tab-separated, or comma-separated when the extension is
    /// `.csv`.
    pub source_file: PathBuf,
    pub font_file: PathBuf,
    /// Name to register the font under; defaults to the file stem.
    pub font_name: Option<String>,
    pub output_file: PathBuf,
    pub year: i32,
    pub sender: SenderProfile,
    /// Replaces the standard hagaki layout. Keys left out keep their
    /// standard values.
    pub layout: Option<LayoutSpec>,
    pub debug_log: Option<PathBuf>,
    pub perf_log: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_file: PathBuf::new(),
            font_file: PathBuf::new(),
            font_name: None,
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            year: chrono::Local::now().year(),
            sender: SenderProfile::default(),
            layout: None,
            debug_log: None,
            perf_log: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HagakiError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            HagakiError::InvalidConfiguration(format!(
                "cannot read {}: {}",
                path.display(),
                err
            ))
        })?;
        let mut config = Self::from_json_str(&text)?;
        config.resolve_relative_to(path.parent().unwrap_or_else(|| Path::new("")));
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, HagakiError> {
        let config: Config = serde_json::from_str(text)
            .map_err(|err| HagakiError::InvalidConfiguration(format!("malformed config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), HagakiError> {
        if self.font_file.as_os_str().is_empty() {
            return Err(missing("font_file"));
        }
        if self.source_file.as_os_str().is_empty() {
            return Err(missing("source_file"));
        }
        if self.sender.family_name.trim().is_empty() {
            return Err(missing("sender.family_name"));
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(missing("output_file"));
        }
        if let Some(layout) = &self.layout {
            layout.validate()?;
        }
        Ok(())
    }

    pub fn layout(&self) -> LayoutSpec {
        self.layout.unwrap_or_default()
    }

    pub fn font_name(&self) -> String {
        self.font_name.clone().unwrap_or_else(|| {
            self.font_file
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("hagaki-font")
                .to_string()
        })
    }

    /// Paths in a config file are relative to the file, not to the working
    /// directory.
    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.source_file,
            &mut self.font_file,
            &mut self.output_file,
        ] {
            rebase(path, base);
        }
        for path in [&mut self.debug_log, &mut self.perf_log]
            .into_iter()
            .flatten()
        {
            rebase(path, base);
        }
    }
}

fn rebase(path: &mut PathBuf, base: &Path) {
    if path.is_relative() && !base.as_os_str().is_empty() {
        *path = base.join(&*path);
    }
}

fn missing(key: &str) -> HagakiError {
    HagakiError::InvalidConfiguration(format!("{key} is not set"))
}
