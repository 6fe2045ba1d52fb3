use crate::error::CutError;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{threshold, ThresholdType};

/// Foreground value in a [`BinaryMask`]
pub const INK: u8 = 255;
/// Background value in a [`BinaryMask`]
pub const PAPER: u8 = 0;

/// Ink/paper mask where ink is 255 and paper is 0, so that summing or
/// averaging pixels measures ink density directly.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    /// Wrap an image already holding only [`INK`] and [`PAPER`] values
    pub fn from_gray(gray: GrayImage) -> Self {
        Self(gray)
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[cfg(test)]
    pub fn is_ink(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == INK
    }

    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    /// Vertical projection over the first `width` columns: mean pixel value
    /// of every column, taken over all rows.
    pub fn column_means(&self, width: u32) -> Vec<f32> {
        let width = width.min(self.width());
        let mut sums = vec![0u64; width as usize];
        for row in self.0.rows() {
            for (x, pixel) in row.take(width as usize).enumerate() {
                sums[x] += pixel.0[0] as u64;
            }
        }
        let rows = self.height().max(1) as f32;
        sums.into_iter().map(|s| s as f32 / rows).collect()
    }

    /// Horizontal projection: mean pixel value of every row
    pub fn row_means(&self) -> Vec<f32> {
        let cols = self.width().max(1) as f32;
        self.0
            .rows()
            .map(|row| row.map(|p| p.0[0] as u64).sum::<u64>() as f32 / cols)
            .collect()
    }
}

/// Threshold and invert: luma at or below `threshold_value` becomes ink.
pub fn apply(image: &DynamicImage, threshold_value: u8) -> Result<BinaryMask, CutError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(CutError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }

    let gray = image.to_luma8();
    let mask = threshold(&gray, threshold_value, ThresholdType::BinaryInverted);
    Ok(BinaryMask(mask))
}
