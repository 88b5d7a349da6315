use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Degenerate image geometry: {width}x{height}")]
    DegenerateGeometry { width: u32, height: u32 },

    #[error("Score report is missing the '{0}' detector entry")]
    MissingDetectorScore(String),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
