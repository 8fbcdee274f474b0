use std::time::Duration;

use thiserror::Error;

pub type ExportResult<T> = Result<T, ExportError>;

/// Everything that can stop an export once a graphic has been supplied.
///
/// A missing graphic is not an error; see [`ExportOutcome::Skipped`](crate::ExportOutcome).
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to parse svg markup: {0}")]
    Parse(#[from] roxmltree::Error),

    #[error("root element is <{0}>, expected <svg>")]
    NotSvg(String),

    #[error("no <{anchor}> element to anchor the {purpose} injection")]
    MissingAnchor {
        anchor: &'static str,
        purpose: &'static str,
    },

    #[error("could not measure title text: {0}")]
    Measure(String),

    #[error("no base64 encoder available: {0}")]
    EncoderUnavailable(String),

    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image decode did not complete within {0:?}")]
    DecodeTimedOut(Duration),

    #[error("invalid canvas size: width={width}, height={height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("unsupported image type: {0}")]
    UnsupportedMime(String),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to read configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
