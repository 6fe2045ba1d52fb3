use crate::config::LayoutConfig;
use crate::error::CutError;
use image::DynamicImage;
use serde::Serialize;
use std::time::Instant;

use super::steps::{self, anchor::Anchor, columns::ColumnRegion, questions::ColumnSegmentation};

/// Timing information for a single segmentation step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Everything the pipeline decided about one page
#[derive(Debug, Clone, Serialize)]
pub struct PageSegmentation {
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    pub anchor: Anchor,
    pub regions: Vec<ColumnRegion>,
    pub columns: Vec<ColumnSegmentation>,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

impl PageSegmentation {
    pub fn question_count(&self) -> usize {
        self.columns.iter().map(|c| c.crops.len()).sum()
    }
}

/// Runs every segmentation step over a page with a fixed configuration
pub struct PagePipeline {
    layout: LayoutConfig,
}

impl PagePipeline {
    pub fn new(layout: LayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutConfig {
        &self.layout
    }

    /// Segment one page into question crops
    pub fn process(
        &self,
        page_index: usize,
        page: &DynamicImage,
    ) -> Result<PageSegmentation, CutError> {
        let start = Instant::now();
        let mut timings = Vec::new();
        let (width, height) = (page.width(), page.height());

        let mask = self.run_step("binarize", &mut timings, || {
            steps::binarize::apply(page, self.layout.binarize_threshold)
        })?;

        let anchor = self.run_step("anchor", &mut timings, || {
            Ok(steps::anchor::locate(&mask, &self.layout))
        })?;
        drop(mask);

        let regions = self.run_step("partition", &mut timings, || {
            steps::columns::partition(width, height, anchor.x, &self.layout)
        })?;

        let columns = self.run_step("segment", &mut timings, || {
            regions
                .iter()
                .map(|region| {
                    let column =
                        page.crop_imm(region.x1, region.y1, region.width(), region.height());
                    steps::questions::segment(&column, region, page_index, &self.layout)
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let segmentation = PageSegmentation {
            page_index,
            width,
            height,
            anchor,
            regions,
            columns,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: timings,
        };

        tracing::info!(
            page = page_index + 1,
            anchor_x = segmentation.anchor.x,
            questions = segmentation.question_count(),
            time_ms = segmentation.total_time_ms,
            "Page segmented"
        );

        Ok(segmentation)
    }

    fn run_step<T, F>(
        &self,
        name: &str,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<T, CutError>
    where
        F: FnOnce() -> Result<T, CutError>,
    {
        let step_start = Instant::now();
        let result = step_fn()?;
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
