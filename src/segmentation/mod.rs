//! Page segmentation: binarize, locate the binding line, partition columns
//! and cut each column into question crops.

pub mod pipeline;
pub mod steps;

pub use pipeline::{PagePipeline, PageSegmentation, StepTiming};
pub use steps::anchor::Anchor;
pub use steps::columns::ColumnRegion;
pub use steps::questions::RejectedSlice;
