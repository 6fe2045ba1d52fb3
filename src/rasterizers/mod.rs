//! PDF rasterizer implementations
//!
//! PDF pages reach the segmentation pipeline through the [`Rasterizer`]
//! trait. The built-in implementation decodes embedded scan images; other
//! backends can be plugged in behind the same trait.

pub mod embedded;

use crate::rasterizer::Rasterizer;
use std::sync::Arc;

pub use embedded::EmbeddedImageRasterizer;

/// Rasterizer used when none is configured
pub fn default_rasterizer() -> Arc<dyn Rasterizer> {
    let rasterizer = EmbeddedImageRasterizer;
    tracing::debug!(
        name = rasterizer.name(),
        description = rasterizer.description(),
        "Using PDF rasterizer"
    );
    Arc::new(rasterizer)
}
