use crate::segmentation::{Anchor, ColumnRegion};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const BAND_DETECTED: Rgb<u8> = Rgb([0, 200, 0]);
const BAND_FALLBACK: Rgb<u8> = Rgb([255, 140, 0]);
const COLUMN_LINE: Rgb<u8> = Rgb([0, 0, 255]);
const STROKE: u32 = 2;

/// Draw the content band and column boundaries over a copy of the page.
///
/// The band is green when the binding line was detected and orange when the
/// default margin was used. The page itself is left untouched.
pub fn render_overlay(
    page: &DynamicImage,
    anchor: &Anchor,
    regions: &[ColumnRegion],
) -> RgbImage {
    let mut overlay = page.to_rgb8();
    let (width, height) = overlay.dimensions();

    if let Some(first) = regions.first() {
        let band_color = if anchor.is_fallback() {
            BAND_FALLBACK
        } else {
            BAND_DETECTED
        };
        let band_w = width.saturating_sub(anchor.x);
        let band_h = first.y2.saturating_sub(first.y1);
        for inset in 0..STROKE {
            let w = band_w.saturating_sub(2 * inset);
            let h = band_h.saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let rect =
                Rect::at((anchor.x + inset) as i32, (first.y1 + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut overlay, rect, band_color);
        }
    }

    if height > 0 {
        // Each line starts at the boundary and extends right, not centred on it
        for region in regions.iter().skip(1) {
            let line_w = STROKE.min(width.saturating_sub(region.x1));
            if line_w == 0 {
                continue;
            }
            let rect = Rect::at(region.x1 as i32, 0).of_size(line_w, height);
            draw_filled_rect_mut(&mut overlay, rect, COLUMN_LINE);
        }
    }

    overlay
}
