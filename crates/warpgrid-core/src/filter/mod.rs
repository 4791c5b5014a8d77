//! Image warping.

pub mod warp;

pub use warp::{warp, warp_frames, warp_into, FrameSink, VecSink, WarpedArray};
