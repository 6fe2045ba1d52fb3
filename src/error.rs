use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CutError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No .pdf, .jpg or .png files found in {}", .0.display())]
    NoInput(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to rasterize PDF page: {0}")]
    Rasterize(String),

    #[error("Image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    #[error("Degenerate page layout: {0}")]
    Layout(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CutError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CutError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for CutError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            CutError::InvalidConfig(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            CutError::NoInput(_) => (StatusCode::BAD_REQUEST, "NO_INPUT"),
            CutError::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            CutError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_ERROR"),
            CutError::Rasterize(_) => (StatusCode::UNPROCESSABLE_ENTITY, "RASTERIZE_ERROR"),
            CutError::EmptyImage { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "EMPTY_IMAGE"),
            CutError::Layout(_) => (StatusCode::UNPROCESSABLE_ENTITY, "LAYOUT_ERROR"),
            CutError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODE_ERROR"),
            CutError::ImageTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "IMAGE_TOO_LARGE"),
            CutError::MissingFile => (StatusCode::BAD_REQUEST, "MISSING_FILE"),
            CutError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            CutError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}
