//! Individual segmentation steps

pub mod anchor;
pub mod binarize;
pub mod columns;
pub mod opening;
pub mod questions;
