//! Data structures representing format components.
//!
//! Contains structured representations of bitstream elements: the metadata
//! chain, frame headers, subframes, Rice residuals, and the channel
//! transforms used throughout the decoding pipeline.

pub mod channel;
pub mod frame;
pub mod metadata;
pub mod residual;
pub mod subframe;
