use super::binarize::{BinaryMask, INK};
use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_open, Mask};

/// Widest structuring element a [`Mask`] can hold
pub const MAX_KERNEL_WIDTH: u32 = 511;

/// Horizontal morphological opening applied before the gap profile.
///
/// Erodes then dilates with a `1 x kernel_width` element anchored at its
/// centre. Ink runs narrower than the element disappear, wider runs keep
/// their extent. Pixels outside the image never constrain the result.
///
/// `kernel_width` must lie in `1..=MAX_KERNEL_WIDTH`, which
/// `LayoutConfig::validate` enforces.
pub fn open_horizontal(mask: &BinaryMask, kernel_width: u32) -> BinaryMask {
    let kernel_width = kernel_width.clamp(1, MAX_KERNEL_WIDTH);
    let element = GrayImage::from_pixel(kernel_width, 1, Luma([INK]));
    let kernel = Mask::from_image(&element, (kernel_width / 2) as u8, 0);
    BinaryMask::from_gray(grayscale_open(mask.as_gray(), &kernel))
}
