use crate::error::CutError;
use image::DynamicImage;
use std::path::Path;

/// A PDF opened for page rendering
pub trait RasterDocument: Send + Sync {
    /// Number of pages in document order
    fn page_count(&self) -> usize;

    /// Render the zero-based page `index` at `scale` pixels per PDF point
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, CutError>;
}

/// Trait that all PDF rasterizers must implement
pub trait Rasterizer: Send + Sync {
    /// Returns the rasterizer identifier (e.g., "embedded")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the rasterizer
    fn description(&self) -> &'static str;

    /// Open a PDF file for rendering
    fn open(&self, path: &Path) -> Result<Box<dyn RasterDocument>, CutError>;
}
