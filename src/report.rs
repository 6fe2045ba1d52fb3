use crate::error::CutError;
use crate::output::OutputWriter;
use crate::segmentation::{Anchor, PageSegmentation, RejectedSlice, StepTiming};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// File name of the batch report inside the output directory
pub const REPORT_FILE: &str = "cut_report.json";

#[derive(Debug, Clone, Serialize)]
pub struct CropRecord {
    /// 1-indexed position within the column
    pub question: u32,
    pub y1: u32,
    pub y2: u32,
    pub mean_intensity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnReport {
    /// 1-indexed column number
    pub column: u32,
    pub x1: u32,
    pub x2: u32,
    pub y1: u32,
    pub y2: u32,
    pub cuts: Vec<u32>,
    pub crops: Vec<CropRecord>,
    pub rejected: Vec<RejectedSlice>,
}

/// Decisions taken for one segmented page
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub width: u32,
    pub height: u32,
    pub anchor: Anchor,
    pub questions: usize,
    pub columns: Vec<ColumnReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_overlay: Option<String>,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

impl PageSummary {
    /// Summarize a segmentation. With `base`, crop records carry the file
    /// names the output writer uses.
    pub fn new(segmentation: &PageSegmentation, base: Option<&str>) -> Self {
        let columns = segmentation
            .columns
            .iter()
            .map(|column| ColumnReport {
                column: column.region.index + 1,
                x1: column.region.x1,
                x2: column.region.x2,
                y1: column.region.y1,
                y2: column.region.y2,
                cuts: column.cuts.clone(),
                crops: column
                    .crops
                    .iter()
                    .map(|crop| CropRecord {
                        question: crop.question_index + 1,
                        y1: crop.y1,
                        y2: crop.y2,
                        mean_intensity: crop.mean_intensity,
                        file: base.map(|b| {
                            OutputWriter::crop_file_name(
                                b,
                                crop.page_index,
                                crop.column_index,
                                crop.question_index,
                            )
                        }),
                    })
                    .collect(),
                rejected: column.rejected.clone(),
            })
            .collect();

        Self {
            width: segmentation.width,
            height: segmentation.height,
            anchor: segmentation.anchor,
            questions: segmentation.question_count(),
            columns,
            debug_overlay: base
                .map(|b| OutputWriter::debug_file_name(b, segmentation.page_index)),
            total_time_ms: segmentation.total_time_ms,
            steps: segmentation.steps.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Segmented(PageSummary),
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PageReport {
    /// 1-indexed page number
    pub page: usize,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

impl PageReport {
    pub fn questions(&self) -> usize {
        match &self.outcome {
            PageOutcome::Segmented(summary) => summary.questions,
            PageOutcome::Failed { .. } => 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PageOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    /// Set when the file could not be opened at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub pages: Vec<PageReport>,
}

/// Aggregated outcome of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub files: Vec<FileReport>,
    pub files_failed: usize,
    pub pages_processed: usize,
    pub pages_failed: usize,
    pub questions: usize,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn new(input: PathBuf, output: PathBuf, files: Vec<FileReport>, elapsed_ms: u64) -> Self {
        let pages = files.iter().flat_map(|f| f.pages.iter());
        let pages_processed = pages.clone().count();
        let pages_failed = pages.clone().filter(|p| p.is_failed()).count();
        let questions = pages.map(PageReport::questions).sum();
        let files_failed = files.iter().filter(|f| f.error.is_some()).count();

        Self {
            input,
            output,
            files,
            files_failed,
            pages_processed,
            pages_failed,
            questions,
            elapsed_ms,
        }
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<(), CutError> {
        let file = File::create(path).map_err(|e| CutError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| CutError::Internal(format!("Failed to serialize report: {}", e)))?;
        writer.flush().map_err(|e| CutError::io(path, e))
    }
}
