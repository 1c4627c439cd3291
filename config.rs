use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::onnx::{OrtRuntimeConfig, ProviderChoice};

pub const HOME_ENV: &str = "DERMALYZE_HOME";
const DEFAULT_HOME: &str = "dermalyze-data";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    #[serde(default = "default_probability_threshold")]
    pub probability_threshold: f32,
    #[serde(default)]
    pub provider: ProviderChoice,
    #[serde(default)]
    pub device_id: Option<u32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            image_size: default_image_size(),
            probability_threshold: default_probability_threshold(),
            provider: ProviderChoice::default(),
            device_id: None,
        }
    }
}

impl AnalysisConfig {
    pub fn runtime(&self) -> OrtRuntimeConfig {
        OrtRuntimeConfig {
            provider: self.provider,
            device_id: self.device_id,
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("skin_model.onnx")
}

fn default_image_size() -> u32 {
    crate::preprocess::IMAGE_SIZE
}

fn default_probability_threshold() -> f32 {
    crate::classifier::PROBABILITY_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub scans_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub models_dir: PathBuf,
}

impl AppPaths {
    /// Resolves the data root from `DERMALYZE_HOME` (or `./dermalyze-data`)
    /// and creates the directory layout below it.
    pub fn discover() -> Result<Self, crate::error::Error> {
        let root = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOME));
        Self::at(root)
    }

    pub fn at(root: impl Into<PathBuf>) -> Result<Self, crate::error::Error> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(crate::error::Error::Path(format!(
                "{HOME_ENV} is set but empty"
            )));
        }

        let db_path = root.join("library.db");
        let scans_dir = root.join("scans");
        let reports_dir = root.join("reports");
        let models_dir = root.join("models");

        std::fs::create_dir_all(&scans_dir)?;
        std::fs::create_dir_all(&reports_dir)?;
        std::fs::create_dir_all(&models_dir)?;

        Ok(Self {
            root,
            db_path,
            scans_dir,
            reports_dir,
            models_dir,
        })
    }

    /// Absolute model paths are used as-is; relative ones are looked up in
    /// `models/`, then next to the working directory.
    pub fn resolve_model(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            return name.to_path_buf();
        }
        let primary = self.models_dir.join(name);
        if primary.exists() {
            return primary;
        }
        let dev_fallback = Path::new("models").join(name);
        if dev_fallback.exists() {
            return dev_fallback;
        }
        primary
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl Settings {
    /// Reads `settings.json` from the data root; a missing file yields defaults.
    pub fn load(paths: &AppPaths) -> Result<Self, crate::error::Error> {
        let path = paths.settings_path();
        let mut settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            log::info!("Loaded settings from {}", path.display());
            serde_json::from_str::<Settings>(&contents)?
        } else {
            log::debug!("No settings file at {}; using defaults", path.display());
            Self::default()
        };
        settings.analysis.model_path = paths.resolve_model(&settings.analysis.model_path);
        Ok(settings)
    }
}
