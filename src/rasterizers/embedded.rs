//! Embedded page image rasterizer
//!
//! Scanned PDFs carry one full-page image per page. This rasterizer decodes
//! that image with lopdf and scales it to the page's MediaBox, so no native
//! PDF renderer is required. Vector-only pages are reported as errors.

use crate::error::CutError;
use crate::rasterizer::{RasterDocument, Rasterizer};
use image::{imageops::FilterType, DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

/// Guard against cyclic `Parent` chains in malformed page trees
const MAX_INHERITANCE_DEPTH: usize = 32;

pub struct EmbeddedImageRasterizer;

impl Rasterizer for EmbeddedImageRasterizer {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn description(&self) -> &'static str {
        "Decodes the largest embedded image of each page (scanned PDFs)"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn RasterDocument>, CutError> {
        let doc = Document::load(path)
            .map_err(|e| CutError::Rasterize(format!("Failed to load PDF: {}", e)))?;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();

        tracing::debug!(
            path = %path.display(),
            pages = page_ids.len(),
            "Opened PDF"
        );

        Ok(Box::new(EmbeddedPages { doc, page_ids }))
    }
}

/// Encoded image payload copied out of the PDF
enum ImageData {
    Jpeg(Vec<u8>),
    Samples(Vec<u8>),
}

struct EmbeddedImage {
    width: u32,
    height: u32,
    bits_per_component: u8,
    color_space: String,
    data: ImageData,
}

struct EmbeddedPage {
    /// MediaBox width and height in points
    media_box: Option<(f64, f64)>,
    image: Result<EmbeddedImage, String>,
}

/// An opened PDF; page images are located and decompressed on render
struct EmbeddedPages {
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl RasterDocument for EmbeddedPages {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, CutError> {
        let page_id = *self.page_ids.get(index).ok_or_else(|| {
            CutError::Rasterize(format!(
                "page {} out of range ({} pages)",
                index + 1,
                self.page_ids.len()
            ))
        })?;
        let page = extract_page(&self.doc, page_id);
        let embedded = page.image.map_err(CutError::Rasterize)?;
        let image = decode_image(&embedded)?;

        let Some((page_w, page_h)) = page.media_box else {
            return Ok(image);
        };
        let target_w = ((page_w * scale as f64).round() as u32).max(1);
        let target_h = ((page_h * scale as f64).round() as u32).max(1);
        if (target_w, target_h) == (image.width(), image.height()) {
            return Ok(image);
        }
        Ok(image.resize_exact(target_w, target_h, FilterType::Triangle))
    }
}

fn extract_page(doc: &Document, page_id: ObjectId) -> EmbeddedPage {
    let page = doc.get_object(page_id).and_then(Object::as_dict).ok();
    let media_box = page
        .and_then(|p| inherited(doc, p, b"MediaBox"))
        .and_then(|o| media_box_size(doc, o));
    let image = match page {
        Some(p) => largest_image(doc, p).and_then(|stream| read_image(doc, stream)),
        None => Err(format!("page object {:?} is not a dictionary", page_id)),
    };
    EmbeddedPage { media_box, image }
}

/// Follow a reference, if any
fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, walking up the page tree for inherited values
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_INHERITANCE_DEPTH {
        if let Ok(value) = node.get(key) {
            return resolve(doc, value);
        }
        node = node
            .get(b"Parent")
            .ok()
            .and_then(|p| resolve(doc, p))
            .and_then(|p| p.as_dict().ok())?;
    }
    None
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn media_box_size(doc: &Document, obj: &Object) -> Option<(f64, f64)> {
    let values: Vec<f64> = obj
        .as_array()
        .ok()?
        .iter()
        .filter_map(|o| resolve(doc, o).and_then(number))
        .collect();
    match values.as_slice() {
        [x1, y1, x2, y2] => {
            let (w, h) = ((x2 - x1).abs(), (y2 - y1).abs());
            (w > 0.0 && h > 0.0).then_some((w, h))
        }
        _ => None,
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> Option<u32> {
    stream
        .dict
        .get(key)
        .ok()
        .and_then(|v| v.as_i64().ok())
        .filter(|v| *v > 0)
        .map(|v| v as u32)
}

fn is_image(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false)
}

/// Pick the image XObject with the largest pixel area on a page
fn largest_image<'a>(doc: &'a Document, page: &'a Dictionary) -> Result<&'a Stream, String> {
    let resources = inherited(doc, page, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .ok_or_else(|| "page has no resources".to_string())?;
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .ok_or_else(|| "page has no embedded images".to_string())?;

    let mut best: Option<(&Stream, u64)> = None;
    for (_, value) in xobjects.iter() {
        let Some(stream) = resolve(doc, value).and_then(|o| o.as_stream().ok()) else {
            continue;
        };
        if !is_image(stream) {
            continue;
        }
        let (Some(w), Some(h)) = (dimension(stream, b"Width"), dimension(stream, b"Height"))
        else {
            continue;
        };
        let area = w as u64 * h as u64;
        if best.map_or(true, |(_, best_area)| area > best_area) {
            best = Some((stream, area));
        }
    }

    best.map(|(stream, _)| stream)
        .ok_or_else(|| "page has no embedded images".to_string())
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn read_image(doc: &Document, stream: &Stream) -> Result<EmbeddedImage, String> {
    let width = dimension(stream, b"Width").ok_or("missing image width")?;
    let height = dimension(stream, b"Height").ok_or("missing image height")?;
    let bits_per_component = stream
        .dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|b| b.as_i64().ok())
        .unwrap_or(8) as u8;
    let color_space = get_color_space(doc, stream);

    let filters = filter_names(stream);
    let data = match filters.as_slice() {
        [only] if only.as_slice() == b"DCTDecode" => ImageData::Jpeg(stream.content.clone()),
        [] => ImageData::Samples(stream.content.clone()),
        _ if filters.iter().any(|f| {
            matches!(
                f.as_slice(),
                b"DCTDecode" | b"JPXDecode" | b"JBIG2Decode" | b"CCITTFaxDecode"
            )
        }) =>
        {
            let names: Vec<String> = filters
                .iter()
                .map(|f| String::from_utf8_lossy(f).to_string())
                .collect();
            return Err(format!("unsupported image filter chain {:?}", names));
        }
        _ => ImageData::Samples(
            stream
                .decompressed_content()
                .map_err(|e| format!("failed to decompress image: {}", e))?,
        ),
    };

    tracing::debug!(
        width,
        height,
        bits_per_component,
        color_space = %color_space,
        "Found page image"
    );

    Ok(EmbeddedImage {
        width,
        height,
        bits_per_component,
        color_space,
        data,
    })
}

fn decode_image(embedded: &EmbeddedImage) -> Result<DynamicImage, CutError> {
    let samples = match &embedded.data {
        ImageData::Jpeg(bytes) => {
            return image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
                .map_err(|e| CutError::Rasterize(format!("Failed to decode JPEG page: {}", e)));
        }
        ImageData::Samples(samples) => samples,
    };

    let (width, height) = (embedded.width, embedded.height);
    let pixels = width as usize * height as usize;
    let bits = embedded.bits_per_component;

    match (embedded.color_space.as_str(), bits) {
        ("DeviceGray", 1) => unpack_bilevel(width, height, samples),
        ("DeviceGray", 8) => gray_from_samples(width, height, samples),
        ("DeviceRGB", 8) => rgb_from_samples(width, height, samples),
        // ICCBased profiles carry their component count in the stream; infer it
        ("ICCBased", 8) if samples.len() >= pixels * 3 => rgb_from_samples(width, height, samples),
        ("ICCBased", 8) => gray_from_samples(width, height, samples),
        ("DeviceCMYK", 8) if samples.len() >= pixels * 4 => {
            let rgb: Vec<u8> = samples[..pixels * 4]
                .chunks_exact(4)
                .flat_map(|chunk| {
                    let c = chunk[0] as f32 / 255.0;
                    let m = chunk[1] as f32 / 255.0;
                    let y = chunk[2] as f32 / 255.0;
                    let k = chunk[3] as f32 / 255.0;
                    [
                        ((1.0 - c) * (1.0 - k) * 255.0) as u8,
                        ((1.0 - m) * (1.0 - k) * 255.0) as u8,
                        ((1.0 - y) * (1.0 - k) * 255.0) as u8,
                    ]
                })
                .collect();
            rgb_from_samples(width, height, &rgb)
        }
        (space, bits) => Err(CutError::Rasterize(format!(
            "Unsupported page image: color_space={}, {} bits, data_len={}",
            space,
            bits,
            samples.len()
        ))),
    }
}

fn gray_from_samples(width: u32, height: u32, samples: &[u8]) -> Result<DynamicImage, CutError> {
    let len = width as usize * height as usize;
    let data = samples.get(..len).ok_or_else(|| short_data(len, samples.len()))?;
    GrayImage::from_raw(width, height, data.to_vec())
        .map(DynamicImage::ImageLuma8)
        .ok_or_else(|| CutError::Rasterize("Invalid grayscale image data".to_string()))
}

fn rgb_from_samples(width: u32, height: u32, samples: &[u8]) -> Result<DynamicImage, CutError> {
    let len = width as usize * height as usize * 3;
    let data = samples.get(..len).ok_or_else(|| short_data(len, samples.len()))?;
    RgbImage::from_raw(width, height, data.to_vec())
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| CutError::Rasterize("Invalid RGB image data".to_string()))
}

/// 1-bit gray rows are byte aligned; a set bit is white
fn unpack_bilevel(width: u32, height: u32, samples: &[u8]) -> Result<DynamicImage, CutError> {
    let stride = (width as usize).div_ceil(8);
    let needed = stride * height as usize;
    if samples.len() < needed {
        return Err(short_data(needed, samples.len()));
    }
    let gray = GrayImage::from_fn(width, height, |x, y| {
        let byte = samples[y as usize * stride + x as usize / 8];
        let bit = (byte >> (7 - (x % 8))) & 1;
        image::Luma([if bit == 1 { 255 } else { 0 }])
    });
    Ok(DynamicImage::ImageLuma8(gray))
}

fn short_data(expected: usize, actual: usize) -> CutError {
    CutError::Rasterize(format!(
        "Image data too short: expected {} bytes, got {}",
        expected, actual
    ))
}

/// Get the color space name from a PDF stream, resolving indirect references
fn get_color_space(doc: &Document, stream: &Stream) -> String {
    let Ok(cs_obj) = stream.dict.get(b"ColorSpace") else {
        return "DeviceRGB".to_string();
    };

    let first_name = |obj: &Object| -> Option<String> {
        if let Ok(name) = obj.as_name() {
            return Some(String::from_utf8_lossy(name).to_string());
        }
        // Arrays like [/ICCBased ref] or [/Indexed ...]
        obj.as_array()
            .ok()
            .and_then(|array| array.first())
            .and_then(|first| first.as_name().ok())
            .map(|name| String::from_utf8_lossy(name).to_string())
    };

    resolve(doc, cs_obj)
        .and_then(first_name)
        .unwrap_or_else(|| "DeviceRGB".to_string())
}
