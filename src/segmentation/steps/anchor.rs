use super::binarize::BinaryMask;
use crate::config::LayoutConfig;
use serde::Serialize;

/// How the anchor x was obtained
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorSource {
    /// A binding line was found at `line_x` with mean intensity `strength`
    Detected { line_x: u32, strength: f32 },
    /// Strongest column (`peak`) stayed under the noise floor
    Fallback { peak: f32 },
}

/// Left content boundary of a page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub x: u32,
    pub source: AnchorSource,
}

impl Anchor {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, AnchorSource::Fallback { .. })
    }
}

/// Locate the printed binding line in the left margin of a page mask.
///
/// Takes the vertical projection of the leftmost `anchor_search_fraction` of
/// the page and picks the strongest column; ties go to the leftmost one. A
/// peak under `anchor_noise_floor` means no line is printed and the anchor
/// falls back to `anchor_fallback_fraction` of the width.
pub fn locate(mask: &BinaryMask, layout: &LayoutConfig) -> Anchor {
    let width = mask.width();
    let search_width = (width as f64 * layout.anchor_search_fraction) as u32;
    let projection = mask.column_means(search_width);

    let mut best_x = 0u32;
    let mut best_val = 0.0f32;
    for (x, &val) in projection.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_x = x as u32;
        }
    }

    if best_val < layout.anchor_noise_floor {
        let x = (width as f64 * layout.anchor_fallback_fraction) as u32;
        tracing::warn!(
            peak = best_val,
            noise_floor = layout.anchor_noise_floor,
            anchor_x = x,
            "No binding line detected, using default left margin"
        );
        return Anchor {
            x,
            source: AnchorSource::Fallback { peak: best_val },
        };
    }

    let x = best_x.saturating_add(layout.anchor_offset);
    tracing::info!(
        line_x = best_x,
        strength = best_val,
        anchor_x = x,
        "Binding line located"
    );
    Anchor {
        x,
        source: AnchorSource::Detected {
            line_x: best_x,
            strength: best_val,
        },
    }
}
