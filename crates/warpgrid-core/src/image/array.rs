//! Dense N-dimensional array with a compile-time number of axes.
//!
//! `GridArray` is the storage type for images, displacement fields, fit data
//! and Jacobian fields. It wraps an [`ndarray::ArrayD`] in standard (row-major)
//! layout and fixes the rank to `D`, so indices are plain `[usize; D]`. Axis
//! `d` of the array is axis `d` of every coordinate; the last axis varies
//! fastest.

use std::ops::{Index, IndexMut};
use ndarray::{ArrayD, IxDyn};
use crate::error::{CoreError, Result};

/// Dense array of rank `D` backed by `ndarray`.
#[derive(Debug, Clone, PartialEq)]
pub struct GridArray<T, const D: usize> {
    data: ArrayD<T>,
}

fn to_index<const D: usize>(pattern: &IxDyn) -> [usize; D] {
    std::array::from_fn(|d| pattern[d])
}

impl<T, const D: usize> GridArray<T, D> {
    /// Wrap existing row-major storage. Fails when `data.len()` disagrees with `shape`.
    pub fn new(shape: [usize; D], data: Vec<T>) -> Result<Self> {
        let len = data.len();
        let data = ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map_err(|_| CoreError::shape_mismatch(&[shape.iter().product()], &[len]))?;
        Ok(Self { data })
    }

    /// Adopt an `ndarray` of rank `D`, copying it into standard layout if needed.
    pub fn from_ndarray(array: ArrayD<T>) -> Result<Self>
    where
        T: Clone,
    {
        if array.ndim() != D {
            return Err(CoreError::shape(format!(
                "expected an array of rank {}, got rank {}",
                D,
                array.ndim()
            )));
        }
        let data = if array.is_standard_layout() {
            array
        } else {
            array.as_standard_layout().into_owned()
        };
        Ok(Self { data })
    }

    /// Build an array by evaluating `f` at every multi-index.
    pub fn from_fn<F>(shape: [usize; D], mut f: F) -> Self
    where
        F: FnMut([usize; D]) -> T,
    {
        Self {
            data: ArrayD::from_shape_fn(IxDyn(&shape), |index| f(to_index(&index))),
        }
    }

    /// Array shape.
    pub fn shape(&self) -> [usize; D] {
        std::array::from_fn(|d| self.data.shape()[d])
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying `ndarray`.
    pub fn as_ndarray(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn into_ndarray(self) -> ArrayD<T> {
        self.data
    }

    /// Row-major offset of a multi-index.
    #[inline]
    pub fn linear_index(&self, index: [usize; D]) -> usize {
        index
            .iter()
            .zip(self.data.strides())
            .map(|(&i, &stride)| i * stride as usize)
            .sum()
    }

    /// Bounds-checked element access.
    pub fn get(&self, index: [usize; D]) -> Option<&T> {
        self.data.get(&index[..])
    }

    pub fn get_mut(&mut self, index: [usize; D]) -> Option<&mut T> {
        self.data.get_mut(&index[..])
    }

    /// Elements in storage order.
    pub fn as_slice(&self) -> &[T] {
        // Storage is always in standard layout.
        self.data.as_slice().unwrap_or_default()
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        self.data.as_slice_mut().unwrap_or_default()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data.into_raw_vec_and_offset().0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.as_mut_slice().iter_mut()
    }

    /// All multi-indices in storage order.
    pub fn indices(&self) -> impl Iterator<Item = [usize; D]> {
        grid_indices(self.shape())
    }

    /// Element-wise map into a new array of the same shape.
    pub fn map<U, F>(&self, f: F) -> GridArray<U, D>
    where
        F: FnMut(&T) -> U,
    {
        GridArray {
            data: self.data.map(f),
        }
    }
}

impl<T: Clone, const D: usize> GridArray<T, D> {
    /// Array of the given shape with every element set to `value`.
    pub fn filled(shape: [usize; D], value: T) -> Self {
        Self {
            data: ArrayD::from_elem(IxDyn(&shape), value),
        }
    }
}

/// Multi-indices of an array of the given shape, in storage order.
pub fn grid_indices<const D: usize>(shape: [usize; D]) -> impl Iterator<Item = [usize; D]> {
    ndarray::indices(IxDyn(&shape))
        .into_iter()
        .map(|index| to_index(&index))
}

impl<T, const D: usize> Index<[usize; D]> for GridArray<T, D> {
    type Output = T;

    fn index(&self, index: [usize; D]) -> &Self::Output {
        &self.data[&index[..]]
    }
}

impl<T, const D: usize> IndexMut<[usize; D]> for GridArray<T, D> {
    fn index_mut(&mut self, index: [usize; D]) -> &mut Self::Output {
        &mut self.data[&index[..]]
    }
}

impl<T, const D: usize> Index<usize> for GridArray<T, D> {
    type Output = T;

    fn index(&self, linear: usize) -> &Self::Output {
        &self.as_slice()[linear]
    }
}

impl<T, const D: usize> IndexMut<usize> for GridArray<T, D> {
    fn index_mut(&mut self, linear: usize) -> &mut Self::Output {
        &mut self.as_mut_slice()[linear]
    }
}
