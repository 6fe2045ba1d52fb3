use super::{binarize, columns::ColumnRegion, opening};
use crate::config::LayoutConfig;
use crate::error::CutError;
use image::DynamicImage;
use serde::Serialize;

/// One accepted question slice. `y1..y2` is relative to the column.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionCrop {
    pub page_index: usize,
    pub column_index: u32,
    /// Zero-based position among the accepted crops of its column
    pub question_index: u32,
    pub y1: u32,
    pub y2: u32,
    pub mean_intensity: f32,
    #[serde(skip)]
    pub image: DynamicImage,
}

impl QuestionCrop {
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    TooShort,
    NearWhite { mean: f32 },
}

/// A slice between two cuts that did not become a question
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RejectedSlice {
    pub y1: u32,
    pub y2: u32,
    #[serde(flatten)]
    pub reason: RejectReason,
}

/// Segmentation result for a single column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSegmentation {
    pub region: ColumnRegion,
    /// Cut rows including the implicit 0 and column height
    pub cuts: Vec<u32>,
    pub crops: Vec<QuestionCrop>,
    pub rejected: Vec<RejectedSlice>,
}

/// Cut a column into question crops at wide blank gaps.
///
/// `column` is the page sub-image covered by `region`.
pub fn segment(
    column: &DynamicImage,
    region: &ColumnRegion,
    page_index: usize,
    layout: &LayoutConfig,
) -> Result<ColumnSegmentation, CutError> {
    let mask = binarize::apply(column, layout.binarize_threshold)?;
    let cleaned = opening::open_horizontal(&mask, layout.rule_kernel_width);
    let profile = cleaned.row_means();
    let cuts = find_cuts(&profile, layout.gap_blank_threshold, layout.gap_min_height);

    let gray = column.to_luma8();
    let mut crops = Vec::new();
    let mut rejected = Vec::new();

    for pair in cuts.windows(2) {
        let (y1, y2) = (pair[0], pair[1]);
        if y2 - y1 <= layout.min_question_height {
            rejected.push(RejectedSlice {
                y1,
                y2,
                reason: RejectReason::TooShort,
            });
            continue;
        }

        let mean = mean_luma(&gray, y1, y2);
        if mean >= layout.near_white_cutoff {
            rejected.push(RejectedSlice {
                y1,
                y2,
                reason: RejectReason::NearWhite { mean },
            });
            continue;
        }

        crops.push(QuestionCrop {
            page_index,
            column_index: region.index,
            question_index: crops.len() as u32,
            y1,
            y2,
            mean_intensity: mean,
            image: column.crop_imm(0, y1, column.width(), y2 - y1),
        });
    }

    tracing::debug!(
        column = region.index,
        cuts = ?cuts,
        accepted = crops.len(),
        rejected = ?rejected,
        "Column segmented"
    );

    Ok(ColumnSegmentation {
        region: *region,
        cuts,
        crops,
        rejected,
    })
}

/// Cut rows from a horizontal projection profile.
///
/// A blank run (rows under `blank_threshold`) longer than `min_gap` is cut at
/// its midpoint once ink resumes. A run that reaches the last row is not
/// cut. The result always starts at 0 and ends at `profile.len()`.
pub fn find_cuts(profile: &[f32], blank_threshold: f32, min_gap: u32) -> Vec<u32> {
    let mut cuts = vec![0u32];
    let mut gap_start: Option<u32> = None;

    for (y, &value) in profile.iter().enumerate() {
        let y = y as u32;
        if value < blank_threshold {
            gap_start.get_or_insert(y);
        } else if let Some(start) = gap_start.take() {
            let len = y - start;
            if len > min_gap {
                cuts.push(start + len / 2);
            }
        }
    }

    cuts.push(profile.len() as u32);
    cuts
}

fn mean_luma(gray: &image::GrayImage, y1: u32, y2: u32) -> f32 {
    let width = gray.width() as usize;
    let start = y1 as usize * width;
    let end = y2 as usize * width;
    let pixels = &gray.as_raw()[start..end];
    if pixels.is_empty() {
        return 255.0;
    }
    pixels.iter().map(|&p| p as u64).sum::<u64>() as f32 / pixels.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// White column with solid black blocks over the given row ranges
    fn column_with_blocks(width: u32, height: u32, blocks: &[(u32, u32)]) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
            let inked = x >= 10
                && x < width - 10
                && blocks.iter().any(|&(a, b)| (a..b).contains(&y));
            Luma([if inked { 0 } else { 255 }])
        }))
    }

    fn region(width: u32, height: u32) -> ColumnRegion {
        ColumnRegion {
            index: 0,
            x1: 0,
            x2: width,
            y1: 0,
            y2: height,
        }
    }

    #[test]
    fn test_wide_gap_splits_two_questions() {
        let column = column_with_blocks(200, 230, &[(0, 100), (130, 230)]);
        let result = segment(&column, &region(200, 230), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.cuts, vec![0, 115, 230]);
        assert_eq!(result.crops.len(), 2);
        assert!(result.crops.iter().all(|c| c.height() >= 40));
        // The crops tile the column: the gap is shared between them
        assert_eq!(result.crops[0].y1, 0);
        assert_eq!(result.crops[0].y2, result.crops[1].y1);
        assert_eq!(result.crops[1].y2, 230);
        let total: u32 = result.crops.iter().map(|c| c.height()).sum();
        assert_eq!(total, 230);
        assert_eq!(result.crops[0].question_index, 0);
        assert_eq!(result.crops[1].question_index, 1);
        assert_eq!(result.crops[1].image.height(), 115);
    }

    #[test]
    fn test_narrow_gap_keeps_single_question() {
        let column = column_with_blocks(200, 210, &[(0, 100), (110, 210)]);
        let result = segment(&column, &region(200, 210), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.cuts, vec![0, 210]);
        assert_eq!(result.crops.len(), 1);
        assert_eq!(result.crops[0].y1, 0);
        assert_eq!(result.crops[0].y2, 210);
    }

    #[test]
    fn test_blank_column_yields_no_crops() {
        let column = column_with_blocks(200, 300, &[]);
        let result = segment(&column, &region(200, 300), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.cuts, vec![0, 300]);
        assert!(result.crops.is_empty());
        assert!(matches!(
            result.rejected[0].reason,
            RejectReason::NearWhite { .. }
        ));
    }

    #[test]
    fn test_near_white_slice_is_rejected_despite_height() {
        // Leading 200px blank run is cut at 100: slice 0..100 is tall but empty
        let column = column_with_blocks(200, 400, &[(200, 300)]);
        let result = segment(&column, &region(200, 400), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.cuts, vec![0, 100, 400]);
        assert_eq!(result.crops.len(), 1);
        assert_eq!(result.crops[0].y1, 100);
        assert_eq!(result.rejected.len(), 1);
        assert_eq!(result.rejected[0].y2, 100);
        assert_eq!(
            result.rejected[0].reason,
            RejectReason::NearWhite { mean: 255.0 }
        );
    }

    #[test]
    fn test_short_slice_is_rejected() {
        // Cut at 15 leaves a 15px slice above the first block
        let column = column_with_blocks(200, 200, &[(30, 200)]);
        let result = segment(&column, &region(200, 200), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.cuts, vec![0, 15, 200]);
        assert_eq!(result.crops.len(), 1);
        assert_eq!(result.rejected[0].reason, RejectReason::TooShort);
    }

    #[test]
    fn test_thin_marks_do_not_block_gaps() {
        // Dotted specks inside the gap are erased by the horizontal opening
        let mut gray = GrayImage::from_pixel(200, 230, Luma([255]));
        for y in (0..100).chain(130..230) {
            for x in 10..190 {
                gray.put_pixel(x, y, Luma([0]));
            }
        }
        for x in (20..180).step_by(6) {
            gray.put_pixel(x, 115, Luma([0]));
            gray.put_pixel(x + 1, 115, Luma([0]));
        }
        let column = DynamicImage::ImageLuma8(gray);
        let result = segment(&column, &region(200, 230), 0, &LayoutConfig::default()).unwrap();

        assert_eq!(result.crops.len(), 2);
    }

    #[test]
    fn test_find_cuts_trailing_gap_is_not_cut() {
        let mut profile = vec![255.0; 50];
        profile.extend(vec![0.0; 100]);
        assert_eq!(find_cuts(&profile, 5.0, 20), vec![0, 150]);
    }

    #[test]
    fn test_find_cuts_gap_must_exceed_minimum() {
        let mut profile = vec![255.0; 50];
        profile.extend(vec![0.0; 20]);
        profile.extend(vec![255.0; 50]);
        assert_eq!(find_cuts(&profile, 5.0, 20), vec![0, 120]);

        let mut profile = vec![255.0; 50];
        profile.extend(vec![0.0; 21]);
        profile.extend(vec![255.0; 50]);
        assert_eq!(find_cuts(&profile, 5.0, 20), vec![0, 60, 121]);
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let column = column_with_blocks(180, 500, &[(20, 140), (200, 260), (330, 480)]);
        let layout = LayoutConfig::default();
        let first = segment(&column, &region(180, 500), 2, &layout).unwrap();
        let second = segment(&column, &region(180, 500), 2, &layout).unwrap();

        assert_eq!(first.cuts, second.cuts);
        let spans = |s: &ColumnSegmentation| -> Vec<(u32, u32)> {
            s.crops.iter().map(|c| (c.y1, c.y2)).collect()
        };
        assert_eq!(spans(&first), spans(&second));
    }
}
