use crate::config::{LayoutConfig, ServerConfig};
use crate::error::CutError;
use crate::rasterizer::Rasterizer;
use crate::report::{PageOutcome, PageReport, PageSummary};
use crate::segmentation::PagePipeline;
use crate::source::{PageSource, SUPPORTED_EXTENSIONS};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub pipeline: Arc<PagePipeline>,
    pub rasterizer: Arc<dyn Rasterizer>,
}

/// Segmentation response
#[derive(Serialize)]
pub struct SegmentResponse {
    pub file: String,
    pub pages: Vec<PageReport>,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub supported_formats: Vec<String>,
    pub rasterizer: String,
    pub layout: LayoutConfig,
    pub pdf_scale: f32,
    pub max_file_size_bytes: usize,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    let max_file_size = state.config.max_file_size;

    Router::new()
        .route("/segment", post(handle_segment))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_file_size)),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: ServerConfig, rasterizer: Arc<dyn Rasterizer>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);

    let state = AppState {
        pipeline: Arc::new(PagePipeline::new(config.layout.clone())),
        config: Arc::new(config),
        rasterizer,
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;

    Ok(())
}

/// Segment an uploaded page image or PDF
async fn handle_segment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SegmentResponse>, CutError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| CutError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            file_data = Some(field.bytes().await.map_err(|e| {
                CutError::InvalidRequest(format!("Failed to read file data: {}", e))
            })?);
        }
    }

    let data = file_data.ok_or(CutError::MissingFile)?;

    if data.len() > state.config.max_file_size {
        return Err(CutError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    let file = file_name.unwrap_or_else(|| "upload".to_string());
    let extension = upload_extension(content_type.as_deref(), &file);

    let mut temp_file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .map_err(|e| CutError::Internal(format!("Failed to create temp file: {}", e)))?;
    temp_file
        .write_all(&data)
        .map_err(|e| CutError::Internal(format!("Failed to write temp file: {}", e)))?;

    let pipeline = Arc::clone(&state.pipeline);
    let rasterizer = Arc::clone(&state.rasterizer);
    let scale = state.config.pdf_scale;
    let pages = tokio::task::spawn_blocking(move || {
        segment_file(temp_file.path(), &pipeline, rasterizer.as_ref(), scale)
    })
    .await
    .map_err(|e| CutError::Internal(format!("Segmentation task failed: {}", e)))??;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let questions: usize = pages.iter().map(PageReport::questions).sum();

    tracing::info!(
        file = %file,
        pages = pages.len(),
        questions,
        processing_time_ms,
        "Segmentation completed"
    );

    Ok(Json(SegmentResponse {
        file,
        pages,
        processing_time_ms,
    }))
}

/// Segment every page of a file; a failing page does not fail the request
fn segment_file(
    path: &Path,
    pipeline: &PagePipeline,
    rasterizer: &dyn Rasterizer,
    scale: f32,
) -> Result<Vec<PageReport>, CutError> {
    let source = PageSource::open(path, rasterizer)?;

    let pages = (0..source.page_count())
        .map(|page_index| {
            let outcome = source
                .page(page_index, scale)
                .and_then(|image| pipeline.process(page_index, &image));
            let outcome = match outcome {
                Ok(segmentation) => PageOutcome::Segmented(PageSummary::new(&segmentation, None)),
                Err(e) => {
                    tracing::error!(page = page_index + 1, error = %e, "Page failed");
                    PageOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            PageReport {
                page: page_index + 1,
                outcome,
            }
        })
        .collect();

    Ok(pages)
}

/// Pick a temp file suffix from the content type, falling back to the upload name
fn upload_extension(content_type: Option<&str>, file_name: &str) -> &'static str {
    match content_type {
        Some("image/png") => return ".png",
        Some("image/jpeg") => return ".jpg",
        Some("application/pdf") => return ".pdf",
        _ => {}
    }

    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());
    match ext.as_deref() {
        Some("png") => ".png",
        Some("jpg") | Some("jpeg") => ".jpg",
        Some("pdf") => ".pdf",
        _ => ".tmp",
    }
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_formats: SUPPORTED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        rasterizer: state.rasterizer.name().to_string(),
        layout: state.pipeline.layout().clone(),
        pdf_scale: state.config.pdf_scale,
        max_file_size_bytes: state.config.max_file_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterizers::EmbeddedImageRasterizer;
    use crate::segmentation::pipeline::tests::synthetic_exam_page;

    #[test]
    fn test_upload_extension() {
        assert_eq!(upload_extension(Some("application/pdf"), "scan"), ".pdf");
        assert_eq!(upload_extension(Some("application/octet-stream"), "a.JPEG"), ".jpg");
        assert_eq!(upload_extension(None, "page.png"), ".png");
        assert_eq!(upload_extension(None, "notes"), ".tmp");
    }

    #[test]
    fn test_segment_file_reports_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        synthetic_exam_page().save(&path).unwrap();

        let pipeline = PagePipeline::new(LayoutConfig::default());
        let pages = segment_file(&path, &pipeline, &EmbeddedImageRasterizer, 2.0).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page, 1);
        assert_eq!(pages[0].questions(), 6);
    }

    #[test]
    fn test_segment_file_sniffs_unnamed_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.tmp");
        synthetic_exam_page()
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let pipeline = PagePipeline::new(LayoutConfig::default());
        let pages = segment_file(&path, &pipeline, &EmbeddedImageRasterizer, 2.0).unwrap();
        assert_eq!(pages[0].questions(), 6);
    }

    #[test]
    fn test_segment_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, b"nope").unwrap();

        let pipeline = PagePipeline::new(LayoutConfig::default());
        let result = segment_file(&path, &pipeline, &EmbeddedImageRasterizer, 2.0);
        assert!(matches!(result, Err(CutError::Decode(_))));
    }
}
