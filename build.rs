use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=runtime/onnxruntime");

    if let Err(err) = copy_runtime_libraries() {
        println!("cargo:warning=Failed to copy ONNX Runtime libraries: {err}");
    }
}

fn runtime_subdir() -> &'static str {
    match env::var("CARGO_CFG_TARGET_OS").as_deref() {
        Ok("windows") => "win-x64-directml",
        Ok("macos") => "macos",
        _ => "linux-x64",
    }
}

fn is_runtime_library(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    name.ends_with(".dll") || name.ends_with(".dylib") || name.contains(".so")
}

// Copies a dropped-in ONNX Runtime build next to the binary so `load-dynamic`
// finds it at `<target>/onnxruntime/`.
fn copy_runtime_libraries() -> std::io::Result<()> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap_or_default());
    let src_dir = manifest_dir
        .join("runtime")
        .join("onnxruntime")
        .join(runtime_subdir());
    if !src_dir.exists() {
        return Ok(());
    }
    let target_dir = out_dir
        .parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "missing target dir"))?;
    let dest_dir = target_dir.join("onnxruntime");
    fs::create_dir_all(&dest_dir)?;
    for entry in fs::read_dir(&src_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_runtime_library(&path) {
            continue;
        }
        fs::copy(&path, dest_dir.join(entry.file_name()))?;
    }
    Ok(())
}
