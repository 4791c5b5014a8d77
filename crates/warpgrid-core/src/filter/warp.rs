//! Warping images through grid deformations.
//!
//! [`WarpedArray`] is a lazy view: element `x` is `source(ϕ(x))`, computed on
//! access. [`warp`] and [`warp_into`] materialize the view; [`warp_frames`]
//! warps independent frames in parallel and hands each to a [`FrameSink`].

use std::sync::Mutex;
use rayon::prelude::*;
use crate::error::{CoreError, Result};
use crate::image::{grid_indices, GridArray};
use crate::interpolation::ContinuousSampler;
use crate::spatial::index_to_point;
use crate::transform::GridDeformation;

/// Lazy `source ∘ ϕ` view over the source domain.
#[derive(Debug, Clone, Copy)]
pub struct WarpedArray<'a, S, const D: usize> {
    source: &'a S,
    deformation: &'a GridDeformation<D>,
}

impl<'a, S: ContinuousSampler<D>, const D: usize> WarpedArray<'a, S, D> {
    /// Requires an interpolating deformation.
    pub fn new(source: &'a S, deformation: &'a GridDeformation<D>) -> Result<Self> {
        if !deformation.is_interpolating() {
            return Err(CoreError::invalid_state("warping requires an interpolating deformation"));
        }
        Ok(Self { source, deformation })
    }

    pub fn shape(&self) -> [usize; D] {
        self.source.shape()
    }

    /// Warped value at a pixel; `NaN` where `ϕ(x)` leaves the source domain.
    pub fn get(&self, index: [usize; D]) -> Result<f64> {
        let x = self.deformation.evaluate(&index_to_point(index))?;
        Ok(self.source.sample(&x))
    }

    /// Copy the view into a new array.
    pub fn materialize(&self) -> Result<GridArray<f64, D>> {
        let mut dest = GridArray::filled(self.shape(), 0.0);
        self.fill(&mut dest)?;
        Ok(dest)
    }

    fn fill(&self, dest: &mut GridArray<f64, D>) -> Result<()> {
        let shape = dest.shape();
        for (index, value) in grid_indices(shape).zip(dest.iter_mut()) {
            *value = self.get(index)?;
        }
        Ok(())
    }
}

/// Warp `source` through `deformation` into a new array of the source shape.
pub fn warp<S, const D: usize>(source: &S, deformation: &GridDeformation<D>) -> Result<GridArray<f64, D>>
where
    S: ContinuousSampler<D>,
{
    WarpedArray::new(source, deformation)?.materialize()
}

/// Warp into caller-provided storage of the source shape.
pub fn warp_into<S, const D: usize>(
    dest: &mut GridArray<f64, D>,
    source: &S,
    deformation: &GridDeformation<D>,
) -> Result<()>
where
    S: ContinuousSampler<D>,
{
    let view = WarpedArray::new(source, deformation)?;
    if dest.shape() != view.shape() {
        return Err(CoreError::shape_mismatch(&view.shape(), &dest.shape()));
    }
    view.fill(dest)
}

/// Destination for warped frames. Frames may arrive in any order.
pub trait FrameSink<const D: usize>: Sync {
    fn write_frame(&self, index: usize, frame: GridArray<f64, D>) -> Result<()>;
}

/// Collects frames into their slots.
#[derive(Debug)]
pub struct VecSink<const D: usize> {
    frames: Mutex<Vec<Option<GridArray<f64, D>>>>,
}

impl<const D: usize> VecSink<D> {
    pub fn new(len: usize) -> Self {
        Self {
            frames: Mutex::new(vec![None; len]),
        }
    }

    /// Frames in index order; `None` for slots never written.
    pub fn into_frames(self) -> Vec<Option<GridArray<f64, D>>> {
        self.frames.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<const D: usize> FrameSink<D> for VecSink<D> {
    fn write_frame(&self, index: usize, frame: GridArray<f64, D>) -> Result<()> {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        let len = frames.len();
        let slot = frames
            .get_mut(index)
            .ok_or_else(|| CoreError::shape(format!("frame {} outside sink of {} frames", index, len)))?;
        *slot = Some(frame);
        Ok(())
    }
}

/// Warp frame `i` of `sources` through `deformations[i]`, in parallel.
pub fn warp_frames<S, K, const D: usize>(
    sources: &[S],
    deformations: &[GridDeformation<D>],
    sink: &K,
) -> Result<()>
where
    S: ContinuousSampler<D> + Sync,
    K: FrameSink<D>,
{
    if sources.len() != deformations.len() {
        return Err(CoreError::shape_mismatch(&[sources.len()], &[deformations.len()]));
    }
    tracing::debug!("Warping {} frames", sources.len());
    sources
        .par_iter()
        .zip(deformations.par_iter())
        .enumerate()
        .try_for_each(|(index, (source, deformation))| {
            let frame = warp(source, deformation)?;
            sink.write_frame(index, frame)
        })
}
