use crate::config::LayoutConfig;
use crate::error::CutError;
use serde::Serialize;

/// Rectangular column of the content band, in page pixels.
/// `x2` and `y2` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColumnRegion {
    pub index: u32,
    pub x1: u32,
    pub x2: u32,
    pub y1: u32,
    pub y2: u32,
}

impl ColumnRegion {
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }
}

/// Split the content band right of `anchor_x` into `layout.columns` equal
/// regions. The last region runs to the page edge to absorb the remainder.
pub fn partition(
    width: u32,
    height: u32,
    anchor_x: u32,
    layout: &LayoutConfig,
) -> Result<Vec<ColumnRegion>, CutError> {
    let y1 = (height as f64 * layout.header_fraction) as u32;
    let y2 = (height as f64 * (1.0 - layout.footer_fraction)) as u32;
    if y2 <= y1 {
        return Err(CutError::Layout(format!(
            "content band is empty (header ends at {}, footer starts at {})",
            y1, y2
        )));
    }

    let columns = layout.columns;
    let usable = width.saturating_sub(anchor_x);
    let column_width = usable / columns.max(1);
    if column_width == 0 {
        return Err(CutError::Layout(format!(
            "anchor x={} leaves {}px for {} columns on a {}px page",
            anchor_x, usable, columns, width
        )));
    }

    let regions = (0..columns)
        .map(|i| {
            let x1 = anchor_x + i * column_width;
            let x2 = if i == columns - 1 {
                width
            } else {
                anchor_x + (i + 1) * column_width
            };
            ColumnRegion {
                index: i,
                x1,
                x2,
                y1,
                y2,
            }
        })
        .collect();

    Ok(regions)
}
