use crate::error::CutError;
use crate::segmentation::PageSegmentation;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Persists question crops and debug overlays under deterministic names.
///
/// Existing files with the same name are overwritten.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    output_dir: PathBuf,
    debug_dir: PathBuf,
    jpeg_quality: u8,
}

impl OutputWriter {
    pub fn new(output_dir: PathBuf, debug_dir: PathBuf, jpeg_quality: u8) -> Self {
        Self {
            output_dir,
            debug_dir,
            jpeg_quality,
        }
    }

    /// Create the output and debug directories
    pub fn prepare(&self) -> Result<(), CutError> {
        for dir in [&self.output_dir, &self.debug_dir] {
            fs::create_dir_all(dir).map_err(|e| CutError::io(dir, e))?;
        }
        Ok(())
    }

    /// `{base}_p{page}_c{column}_q{question}.jpg`, all 1-indexed
    pub fn crop_file_name(
        base: &str,
        page_index: usize,
        column_index: u32,
        question_index: u32,
    ) -> String {
        format!(
            "{}_p{}_c{}_q{}.jpg",
            base,
            page_index + 1,
            column_index + 1,
            question_index + 1
        )
    }

    /// `debug_{base}_p{page}.jpg`, 1-indexed
    pub fn debug_file_name(base: &str, page_index: usize) -> String {
        format!("debug_{}_p{}.jpg", base, page_index + 1)
    }

    /// Write every accepted crop of a page, returning the written paths
    pub fn write_crops(
        &self,
        base: &str,
        segmentation: &PageSegmentation,
    ) -> Result<Vec<PathBuf>, CutError> {
        let mut written = Vec::with_capacity(segmentation.question_count());
        for crop in segmentation.columns.iter().flat_map(|c| c.crops.iter()) {
            let name =
                Self::crop_file_name(base, crop.page_index, crop.column_index, crop.question_index);
            let path = self.output_dir.join(name);
            write_jpeg(&path, &crop.image.to_rgb8(), self.jpeg_quality)?;
            tracing::debug!(
                column = crop.column_index + 1,
                question = crop.question_index + 1,
                height = crop.height(),
                "Wrote question crop"
            );
            written.push(path);
        }
        Ok(written)
    }

    /// Write the debug overlay of a page
    pub fn write_debug(
        &self,
        base: &str,
        page_index: usize,
        overlay: &RgbImage,
    ) -> Result<PathBuf, CutError> {
        let path = self.debug_dir.join(Self::debug_file_name(base, page_index));
        write_jpeg(&path, overlay, self.jpeg_quality)?;
        Ok(path)
    }
}

fn write_jpeg(path: &Path, image: &RgbImage, quality: u8) -> Result<(), CutError> {
    let file = File::create(path).map_err(|e| CutError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, quality)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| CutError::Encode(format!("{}: {}", path.display(), e)))?;
    writer.flush().map_err(|e| CutError::io(path, e))?;
    tracing::debug!(path = %path.display(), "Wrote image");
    Ok(())
}
