use crate::error::CutError;
use crate::rasterizer::{RasterDocument, Rasterizer};
use image::{DynamicImage, ImageReader};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Input file extensions picked up from the input directory
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "jpg", "png"];

/// A file queued for segmentation
#[derive(Debug, Clone, PartialEq)]
pub struct InputFile {
    pub path: PathBuf,
    /// File name without extension, used to name outputs
    pub base_name: String,
}

impl InputFile {
    pub fn new(path: PathBuf) -> Self {
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "page".to_string());
        Self { path, base_name }
    }
}

/// List supported files in `dir`, sorted by name
pub fn discover_inputs(dir: &Path) -> Result<Vec<InputFile>, CutError> {
    let entries = fs::read_dir(dir).map_err(|e| CutError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CutError::io(dir, e))?.path();
        if path.is_file() && has_supported_extension(&path) {
            files.push(InputFile::new(path));
        }
    }
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Pages of one input file
pub enum PageSource {
    Image(DynamicImage),
    Pdf(Box<dyn RasterDocument>),
}

impl PageSource {
    /// Load a raster file or open a PDF through `rasterizer`
    pub fn open(path: &Path, rasterizer: &dyn Rasterizer) -> Result<Self, CutError> {
        if is_pdf(path)? {
            return Ok(Self::Pdf(rasterizer.open(path)?));
        }
        // Sniff the format from content; names of uploads and scans can lie
        let image = ImageReader::open(path)
            .map_err(|e| CutError::io(path, e))?
            .with_guessed_format()
            .map_err(|e| CutError::io(path, e))?
            .decode()
            .map_err(|e| CutError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(Self::Image(image))
    }

    pub fn page_count(&self) -> usize {
        match self {
            Self::Image(_) => 1,
            Self::Pdf(doc) => doc.page_count(),
        }
    }

    /// Produce the zero-based page `index`; `scale` applies to PDF pages only
    pub fn page(&self, index: usize, scale: f32) -> Result<DynamicImage, CutError> {
        match self {
            Self::Image(image) if index == 0 => Ok(image.clone()),
            Self::Image(_) => Err(CutError::Internal(format!(
                "raster file has one page, requested page {}",
                index + 1
            ))),
            Self::Pdf(doc) => doc.render_page(index, scale),
        }
    }
}

/// Check if a file is a PDF by its extension or magic bytes
pub fn is_pdf(path: &Path) -> Result<bool, CutError> {
    if let Some(ext) = path.extension() {
        if ext.to_string_lossy().to_lowercase() == "pdf" {
            return Ok(true);
        }
    }

    let mut file = File::open(path).map_err(|e| CutError::io(path, e))?;
    let mut magic = [0u8; 5];
    if file.read_exact(&mut magic).is_ok() {
        return Ok(&magic == b"%PDF-");
    }

    Ok(false)
}
