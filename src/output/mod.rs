//! Debug overlays and on-disk output

pub mod debug;
pub mod writer;

pub use debug::render_overlay;
pub use writer::OutputWriter;
