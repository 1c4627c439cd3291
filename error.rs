use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    /// The input image could not be decoded; nothing was analyzed.
    #[error("Could not decode image: {0}")]
    Decode(image::ImageError),

    #[error("PDF Error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Report Error: {0}")]
    Report(String),

    /// The model asset is missing or corrupt; no classification can run.
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Path Error: {0}")]
    Path(String),

    #[error("Not found: {0}")]
    NotFound(String),
}
