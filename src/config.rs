use crate::error::CutError;
use crate::segmentation::steps::opening::MAX_KERNEL_WIDTH;
use crate::{CutArgs, ServeArgs};
use serde::Serialize;
use std::path::PathBuf;

/// Page layout and segmentation tunables, shared by every pipeline step.
///
/// Each field is settable from the command line or a `CUTTER_*` environment
/// variable. Defaults match a three-column exam sheet rendered at 2x.
#[derive(clap::Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Number of question columns per page
    #[arg(long, env = "CUTTER_COLUMNS", default_value_t = 3)]
    pub columns: u32,

    /// Fraction of page height skipped as header
    #[arg(long, env = "CUTTER_HEADER_FRACTION", default_value_t = 0.14)]
    pub header_fraction: f64,

    /// Fraction of page height skipped as footer
    #[arg(long, env = "CUTTER_FOOTER_FRACTION", default_value_t = 0.05)]
    pub footer_fraction: f64,

    /// Luma at or below which a pixel counts as ink
    #[arg(long, env = "CUTTER_BINARIZE_THRESHOLD", default_value_t = 200)]
    pub binarize_threshold: u8,

    /// Fraction of page width searched for the binding line
    #[arg(long, env = "CUTTER_ANCHOR_SEARCH_FRACTION", default_value_t = 0.2)]
    pub anchor_search_fraction: f64,

    /// Minimum mean column intensity (0-255) accepted as a binding line
    #[arg(long, env = "CUTTER_ANCHOR_NOISE_FLOOR", default_value_t = 50.0)]
    pub anchor_noise_floor: f32,

    /// Pixels added to the detected line x to step past its stroke
    #[arg(long, env = "CUTTER_ANCHOR_OFFSET", default_value_t = 20)]
    pub anchor_offset: u32,

    /// Fraction of page width used as anchor when no line is found
    #[arg(long, env = "CUTTER_ANCHOR_FALLBACK_FRACTION", default_value_t = 0.08)]
    pub anchor_fallback_fraction: f64,

    /// Width of the horizontal element used to erase rule lines
    #[arg(long, env = "CUTTER_RULE_KERNEL_WIDTH", default_value_t = 15)]
    pub rule_kernel_width: u32,

    /// Row mean intensity (0-255) below which a row is blank
    #[arg(long, env = "CUTTER_GAP_BLANK_THRESHOLD", default_value_t = 5.0)]
    pub gap_blank_threshold: f32,

    /// Blank runs must be longer than this many rows to cut
    #[arg(long, env = "CUTTER_GAP_MIN_HEIGHT", default_value_t = 20)]
    pub gap_min_height: u32,

    /// Slices must be taller than this many rows to become questions
    #[arg(long, env = "CUTTER_MIN_QUESTION_HEIGHT", default_value_t = 40)]
    pub min_question_height: u32,

    /// Slices with mean luma at or above this are discarded as blank
    #[arg(long, env = "CUTTER_NEAR_WHITE_CUTOFF", default_value_t = 250.0)]
    pub near_white_cutoff: f32,
}

/// Immutable segmentation configuration handed to each pipeline step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutConfig {
    pub columns: u32,
    pub header_fraction: f64,
    pub footer_fraction: f64,
    pub binarize_threshold: u8,
    pub anchor_search_fraction: f64,
    pub anchor_noise_floor: f32,
    pub anchor_offset: u32,
    pub anchor_fallback_fraction: f64,
    pub rule_kernel_width: u32,
    pub gap_blank_threshold: f32,
    pub gap_min_height: u32,
    pub min_question_height: u32,
    pub near_white_cutoff: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            columns: 3,
            header_fraction: 0.14,
            footer_fraction: 0.05,
            binarize_threshold: 200,
            anchor_search_fraction: 0.2,
            anchor_noise_floor: 50.0,
            anchor_offset: 20,
            anchor_fallback_fraction: 0.08,
            rule_kernel_width: 15,
            gap_blank_threshold: 5.0,
            gap_min_height: 20,
            min_question_height: 40,
            near_white_cutoff: 250.0,
        }
    }
}

impl LayoutConfig {
    /// Reject values that would make page geometry meaningless
    pub fn validate(&self) -> Result<(), CutError> {
        if self.columns == 0 {
            return Err(CutError::InvalidConfig(
                "column count must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("header fraction", self.header_fraction),
            ("footer fraction", self.footer_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(CutError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, value
                )));
            }
        }
        if self.header_fraction + self.footer_fraction >= 1.0 {
            return Err(CutError::InvalidConfig(format!(
                "header ({}) and footer ({}) fractions leave no content band",
                self.header_fraction, self.footer_fraction
            )));
        }
        if !(self.anchor_search_fraction > 0.0 && self.anchor_search_fraction <= 1.0) {
            return Err(CutError::InvalidConfig(format!(
                "anchor search fraction must be in (0, 1], got {}",
                self.anchor_search_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.anchor_fallback_fraction) {
            return Err(CutError::InvalidConfig(format!(
                "anchor fallback fraction must be in [0, 1), got {}",
                self.anchor_fallback_fraction
            )));
        }
        if !(1..=MAX_KERNEL_WIDTH).contains(&self.rule_kernel_width) {
            return Err(CutError::InvalidConfig(format!(
                "rule kernel width must be in 1..={}, got {}",
                MAX_KERNEL_WIDTH, self.rule_kernel_width
            )));
        }
        Ok(())
    }
}

impl TryFrom<LayoutArgs> for LayoutConfig {
    type Error = CutError;

    fn try_from(args: LayoutArgs) -> Result<Self, Self::Error> {
        let layout = Self {
            columns: args.columns,
            header_fraction: args.header_fraction,
            footer_fraction: args.footer_fraction,
            binarize_threshold: args.binarize_threshold,
            anchor_search_fraction: args.anchor_search_fraction,
            anchor_noise_floor: args.anchor_noise_floor,
            anchor_offset: args.anchor_offset,
            anchor_fallback_fraction: args.anchor_fallback_fraction,
            rule_kernel_width: args.rule_kernel_width,
            gap_blank_threshold: args.gap_blank_threshold,
            gap_min_height: args.gap_min_height,
            min_question_height: args.min_question_height,
            near_white_cutoff: args.near_white_cutoff,
        };
        layout.validate()?;
        Ok(layout)
    }
}

/// Batch run configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub debug_dir: PathBuf,
    pub jobs: usize,
    pub pdf_scale: f32,
    pub jpeg_quality: u8,
    pub layout: LayoutConfig,
}

impl TryFrom<CutArgs> for Config {
    type Error = CutError;

    fn try_from(args: CutArgs) -> Result<Self, Self::Error> {
        validate_scale(args.pdf_scale)?;
        if !(1..=100).contains(&args.jpeg_quality) {
            return Err(CutError::InvalidConfig(format!(
                "JPEG quality must be in 1..=100, got {}",
                args.jpeg_quality
            )));
        }

        let jobs = args.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        Ok(Self {
            debug_dir: args.debug_dir.unwrap_or_else(|| args.output.clone()),
            input: args.input,
            output: args.output,
            jobs: jobs.max(1),
            pdf_scale: args.pdf_scale,
            jpeg_quality: args.jpeg_quality,
            layout: LayoutConfig::try_from(args.layout)?,
        })
    }
}

/// HTTP service configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub pdf_scale: f32,
    pub layout: LayoutConfig,
}

impl TryFrom<ServeArgs> for ServerConfig {
    type Error = CutError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        validate_scale(args.pdf_scale)?;
        Ok(Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            pdf_scale: args.pdf_scale,
            layout: LayoutConfig::try_from(args.layout)?,
        })
    }
}

fn validate_scale(scale: f32) -> Result<(), CutError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(())
    } else {
        Err(CutError::InvalidConfig(format!(
            "PDF scale must be positive, got {}",
            scale
        )))
    }
}
