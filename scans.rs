use crate::classifier::DiagnosisResult;
use crate::db::{self, DbPool};
use crate::error::Result;
use crate::models::{scan_id, ScanRecord};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// JPEG quality of the stored scan copies.
pub const SCAN_JPEG_QUALITY: u8 = 85;

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&rgb)?;
    Ok(out)
}

/// Writes `scan_<id>.jpg` into `dest_dir` and returns its path.
pub fn save_scan_image(img: &DynamicImage, dest_dir: &Path, scan_id: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let output = dest_dir.join(format!("scan_{scan_id}.jpg"));
    let bytes = encode_jpeg(img, SCAN_JPEG_QUALITY)?;
    std::fs::write(&output, bytes)?;
    log::debug!("Image saved to: {}", output.display());
    Ok(output)
}

pub fn remove_scan_image(path: &Path) {
    if path.exists() {
        if let Err(err) = std::fs::remove_file(path) {
            log::warn!("Failed to remove scan image {}: {}", path.display(), err);
        }
    }
}

/// Stores a copy of the analyzed image and records the result in the user's
/// history. A scan taken in the same second replaces the earlier one. A new
/// copy is removed again if the record cannot be written.
pub fn persist_scan(
    pool: &DbPool,
    scans_dir: &Path,
    user_id: &str,
    img: &DynamicImage,
    taken_at: DateTime<Local>,
    result: &DiagnosisResult,
) -> Result<ScanRecord> {
    let conn = pool.get()?;
    let id = scan_id(taken_at);
    let replacing = db::get_scan(&conn, user_id, &id)?.is_some();
    if replacing {
        log::info!("Replacing scan {id} for {user_id}");
    }
    let saved = save_scan_image(img, scans_dir, &id)?;
    let record = ScanRecord::from_result(
        user_id,
        taken_at,
        saved.to_string_lossy().to_string(),
        result,
    );
    if let Err(err) = db::insert_scan(&conn, &record) {
        log::error!("Failed to save scan {id}: {err}");
        // An earlier row still points at this file.
        if !replacing {
            remove_scan_image(&saved);
        }
        return Err(err);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::SkinCondition;
    use chrono::TimeZone;
    use image::{Rgb, RgbImage};
    use r2d2_sqlite::SqliteConnectionManager;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("dermalyze_{name}_{}", std::process::id()))
    }

    fn lesion() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([150, 90, 70])))
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported_image(Path::new("lesion.JPG")));
        assert!(is_supported_image(Path::new("lesion.png")));
        assert!(!is_supported_image(Path::new("lesion.cr2")));
        assert!(!is_supported_image(Path::new("lesion")));
    }

    #[test]
    fn saved_scan_decodes_back() {
        let dir = temp_dir("scans");
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb([200, 100, 50])));
        let path = save_scan_image(&img, &dir, "20240101_120000").unwrap();
        assert_eq!(path.file_name().unwrap(), "scan_20240101_120000.jpg");
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (40, 30));
        remove_scan_image(&path);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persisted_scan_is_listed() {
        let dir = temp_dir("persist");
        let pool = db::init_memory_database().unwrap();
        let taken_at = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let result = DiagnosisResult::for_condition(SkinCondition::BasalCellCarcinoma, 0.66);
        let record = persist_scan(&pool, &dir, "alice", &lesion(), taken_at, &result).unwrap();
        assert_eq!(record.id, "20240501_083000");
        assert!(Path::new(&record.image_path).exists());

        let conn = pool.get().unwrap();
        let listed = db::list_scans(&conn, "alice", None).unwrap();
        assert_eq!(listed, vec![record]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn same_second_reanalysis_replaces_scan() {
        let dir = temp_dir("dup");
        let pool = db::init_memory_database().unwrap();
        let taken_at = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let first_result = DiagnosisResult::for_condition(SkinCondition::Melanoma, 0.9);
        persist_scan(&pool, &dir, "alice", &lesion(), taken_at, &first_result).unwrap();

        let second_result = DiagnosisResult::for_condition(SkinCondition::Dermatofibroma, 0.8);
        let second = persist_scan(&pool, &dir, "alice", &lesion(), taken_at, &second_result).unwrap();
        assert!(Path::new(&second.image_path).exists());

        let conn = pool.get().unwrap();
        let listed = db::list_scans(&conn, "alice", None).unwrap();
        assert_eq!(listed, vec![second]);
        assert_eq!(listed[0].condition, "Dermatofibroma");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_insert_removes_image() {
        let dir = temp_dir("rollback");
        // The lookup succeeds but the CHECK rejects every insert.
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .unwrap();
        pool.get()
            .unwrap()
            .execute_batch(
                "CREATE TABLE scans (user_id TEXT, id TEXT, timestamp INTEGER, image_path TEXT, condition TEXT, confidence REAL, recommendations TEXT, CHECK (confidence > 1.0));",
            )
            .unwrap();
        let taken_at = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let result = DiagnosisResult::for_condition(SkinCondition::Melanoma, 0.9);
        assert!(persist_scan(&pool, &dir, "alice", &lesion(), taken_at, &result).is_err());
        assert!(!dir.join("scan_20240501_083000.jpg").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
