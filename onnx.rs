use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

#[cfg(target_os = "windows")]
use ort::execution_providers::{DirectMLExecutionProvider, ExecutionProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InferenceProvider {
    Cpu,
    DirectML { device_id: u32 },
}

impl InferenceProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::DirectML { .. } => "GPU (DirectML)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProviderChoice {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "cpu")]
    CpuOnly,
    #[serde(rename = "directml")]
    DirectMLOnly,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OrtRuntimeConfig {
    pub provider: ProviderChoice,
    pub device_id: Option<u32>,
}

impl OrtRuntimeConfig {
    fn resolved_device_id(self) -> u32 {
        self.device_id.unwrap_or(0)
    }
}

#[cfg(target_os = "windows")]
const ORT_LIBRARY: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const ORT_LIBRARY: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ORT_LIBRARY: &str = "libonnxruntime.so";

#[cfg(target_os = "windows")]
const RUNTIME_SUBDIR: &str = "win-x64-directml";
#[cfg(target_os = "macos")]
const RUNTIME_SUBDIR: &str = "macos";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const RUNTIME_SUBDIR: &str = "linux-x64";

fn ort_candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            candidates.push(parent.join("onnxruntime").join(ORT_LIBRARY));
        }
    }
    candidates.push(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("runtime")
            .join("onnxruntime")
            .join(RUNTIME_SUBDIR)
            .join(ORT_LIBRARY),
    );
    candidates
}

fn pick_ort_library(candidates: Vec<PathBuf>) -> Option<(PathBuf, PathBuf)> {
    for candidate in candidates {
        if candidate.exists() {
            let dir = candidate.parent()?.to_path_buf();
            return Some((candidate, dir));
        }
    }
    None
}

fn resolve_ort_dylib_path() -> Option<(PathBuf, PathBuf)> {
    if let Ok(path) = std::env::var("ORT_DYLIB_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            let dir = path.parent()?.to_path_buf();
            return Some((path, dir));
        }
    }
    pick_ort_library(ort_candidate_paths())
}

#[cfg(target_os = "windows")]
fn prepend_path_dir(dir: &Path) {
    let paths = std::env::var_os("PATH").unwrap_or_default();
    let mut new_paths = std::ffi::OsString::new();
    new_paths.push(dir);
    new_paths.push(";");
    new_paths.push(&paths);
    std::env::set_var("PATH", new_paths);
}

#[cfg(not(target_os = "windows"))]
fn prepend_path_dir(_dir: &Path) {}

fn set_ort_dylib_path(dylib_path: &Path, dylib_dir: &Path) {
    std::env::set_var("ORT_DYLIB_PATH", dylib_path);
    prepend_path_dir(dylib_dir);
}

fn ensure_environment() -> Result<()> {
    match resolve_ort_dylib_path() {
        Some((dylib_path, dylib_dir)) => set_ort_dylib_path(&dylib_path, &dylib_dir),
        None => log::debug!("No bundled {ORT_LIBRARY}; relying on the system loader"),
    }
    // ort panics when the runtime library itself cannot be loaded.
    let commit = || -> Result<()> {
        let committed = ort::init()
            .with_name("dermalyze")
            .commit()
            .map_err(|e| Error::ModelLoad(format!("Failed to init ORT environment: {e}")))?;
        if committed {
            if let Ok(env) = ort::environment::get_environment() {
                env.set_log_level(ort::logging::LogLevel::Warning);
            }
        }
        Ok(())
    };
    match std::panic::catch_unwind(commit) {
        Ok(res) => res,
        Err(_) => Err(Error::ModelLoad(format!(
            "ONNX Runtime library {ORT_LIBRARY} could not be loaded"
        ))),
    }
}

/// Builds an inference session for `model_path`, preferring DirectML when
/// requested and available and falling back to the CPU provider.
pub fn build_session(
    model_path: &Path,
    cfg: OrtRuntimeConfig,
) -> Result<(Session, InferenceProvider)> {
    if !model_path.is_file() {
        return Err(Error::ModelLoad(format!(
            "Model not found: {}",
            model_path.display()
        )));
    }
    ensure_environment()?;
    #[cfg_attr(not(target_os = "windows"), allow(unused_variables))]
    let device_id = cfg.resolved_device_id();

    #[cfg_attr(not(target_os = "windows"), allow(unused_variables))]
    let try_build = |use_dml: bool| -> Result<Session> {
        let build = || -> Result<Session> {
            #[cfg_attr(not(target_os = "windows"), allow(unused_mut))]
            let mut builder = Session::builder()
                .map_err(|e| Error::ModelLoad(format!("{e}")))?
                .with_optimization_level(GraphOptimizationLevel::Level1)
                .map_err(|e| Error::ModelLoad(format!("{e}")))?
                .with_parallel_execution(false)
                .map_err(|e| Error::ModelLoad(format!("{e}")))?;
            #[cfg(target_os = "windows")]
            if use_dml {
                builder = builder
                    .with_memory_pattern(false)
                    .map_err(|e| Error::ModelLoad(format!("{e}")))?;
                let ep = DirectMLExecutionProvider::default()
                    .with_device_id(device_id as i32)
                    .build();
                builder = builder
                    .with_execution_providers([ep])
                    .map_err(|e| Error::ModelLoad(format!("{e}")))?;
            }
            builder
                .commit_from_file(model_path)
                .map_err(|e| Error::ModelLoad(format!("{}: {e}", model_path.display())))
        };
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)) {
            Ok(res) => res,
            Err(_) => Err(Error::ModelLoad(
                "ONNX Runtime panicked while building session".into(),
            )),
        }
    };

    let wants_dml = matches!(cfg.provider, ProviderChoice::Auto | ProviderChoice::DirectMLOnly);
    #[cfg(target_os = "windows")]
    {
        if wants_dml {
            if let Ok(true) = DirectMLExecutionProvider::default().is_available() {
                match try_build(true) {
                    Ok(session) => {
                        return Ok((session, InferenceProvider::DirectML { device_id }))
                    }
                    Err(err) => log::warn!("DirectML session failed: {err}"),
                }
            }
        }
    }

    if cfg.provider == ProviderChoice::DirectMLOnly || (wants_dml && cfg!(target_os = "windows")) {
        log::warn!(
            "DirectML execution provider unavailable; falling back to CPU for {}",
            model_path.display()
        );
    }

    let session = try_build(false)?;
    Ok((session, InferenceProvider::Cpu))
}

pub fn ort_runtime_version() -> Option<String> {
    resolve_ort_dylib_path()?;
    let info = std::panic::catch_unwind(ort::info).ok()?;
    if let Some(start) = info.find("git-branch=rel-") {
        let tail = &info[start + "git-branch=rel-".len()..];
        if let Some(end) = tail.find(',') {
            return Some(tail[..end].to_string());
        }
        return Some(tail.to_string());
    }
    Some(format!("1.{}.x", ort::MINOR_VERSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_load_error() {
        let path = std::env::temp_dir().join("dermalyze_missing_model.onnx");
        let err = build_session(&path, OrtRuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn corrupt_model_is_load_error_not_panic() {
        let path = std::env::temp_dir().join(format!("dermalyze_corrupt_{}.onnx", std::process::id()));
        std::fs::write(&path, b"this is not an onnx graph").unwrap();
        let result = std::panic::catch_unwind(|| build_session(&path, OrtRuntimeConfig::default()));
        let _ = std::fs::remove_file(&path);
        let err = result.expect("model loading must not panic").unwrap_err();
        assert!(matches!(err, Error::ModelLoad(_)));
    }

    #[test]
    fn provider_choice_reads_lowercase_names() {
        let choice: ProviderChoice = serde_json::from_str("\"directml\"").unwrap();
        assert_eq!(choice, ProviderChoice::DirectMLOnly);
        assert_eq!(ProviderChoice::default(), ProviderChoice::Auto);
    }

    #[test]
    fn picks_first_existing_library() {
        let dir = std::env::temp_dir().join(format!("dermalyze_ort_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join(ORT_LIBRARY);
        std::fs::write(&present, b"").unwrap();
        let picked = pick_ort_library(vec![dir.join("absent").join(ORT_LIBRARY), present.clone()]);
        assert_eq!(picked, Some((present, dir.clone())));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
