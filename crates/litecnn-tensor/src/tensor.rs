//! The strided [`Tensor`] type.
//!
//! A tensor owns no elements of its own: it is a window (shape, strides and
//! offset) onto a buffer shared through an `Arc<RwLock<Vec<f64>>>`. Cheap
//! operations such as [`Tensor::t`], [`Tensor::reshape`] and
//! [`Tensor::slice`] only rewrite the window.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::shape::{Shape, MAX_DIMS};
use crate::{TensorError, TensorResult};

/// Seed used by [`Tensor::uniform`] and [`Tensor::gaussian`].
///
/// Every call restarts the generator from this seed, so two tensors of the
/// same size filled with the same scale receive identical values.
pub const DEFAULT_SEED: u64 = 1;

type Buffer = Arc<RwLock<Vec<f64>>>;

/// A view of up to four axes over a shared `f64` buffer.
///
/// `Clone` is shallow: the clone aliases the same elements. Use
/// [`Tensor::fork`] for a deep copy.
#[derive(Clone)]
pub struct Tensor {
    ndim: usize,
    shape: [usize; MAX_DIMS],
    stride: [usize; MAX_DIMS],
    offset: usize,
    pub(crate) data: Buffer,
}

/// Visits every index of a padded shape in row-major order.
pub(crate) fn for_each_index(shape: &[usize; MAX_DIMS], mut f: impl FnMut([usize; MAX_DIMS])) {
    for i0 in 0..shape[0] {
        for i1 in 0..shape[1] {
            for i2 in 0..shape[2] {
                for i3 in 0..shape[3] {
                    f([i0, i1, i2, i3]);
                }
            }
        }
    }
}

#[inline]
pub(crate) fn dot4(index: &[usize; MAX_DIMS], stride: &[usize; MAX_DIMS]) -> usize {
    index.iter().zip(stride.iter()).map(|(i, s)| i * s).sum()
}

impl Tensor {
    /// Creates a tensor of the given shape.
    ///
    /// With `data == None` the tensor is zero-filled; otherwise `data` is
    /// taken in row-major order and must hold exactly `numel` values.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] for an empty, zero-sized or
    /// more-than-four-axis shape, and [`TensorError::ShapeMismatch`] when the
    /// data length disagrees with the shape.
    pub fn new(shape: &[usize], data: Option<Vec<f64>>) -> TensorResult<Self> {
        let shape = Shape::checked(shape)?;
        let data = match data {
            Some(data) if data.len() != shape.numel() => {
                return Err(TensorError::ShapeMismatch {
                    expected: shape.into_vec(),
                    got: vec![data.len()],
                });
            }
            Some(data) => data,
            None => vec![0.0; shape.numel()],
        };
        Ok(Self::from_shape_unchecked(&shape, data))
    }

    /// Creates a zero-filled tensor.
    pub fn zeros(shape: &[usize]) -> TensorResult<Self> {
        Self::new(shape, None)
    }

    /// Creates a tensor from row-major data.
    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> TensorResult<Self> {
        Self::new(shape, Some(data))
    }

    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: f64) -> Self {
        Self::from_shape_unchecked(&Shape::scalar(), vec![value])
    }

    /// Creates a fresh zero-filled tensor with the same shape as `self`.
    #[doc(alias = "as_zeros")]
    pub fn zeros_like(&self) -> Self {
        let shape = self.active_shape();
        let numel = shape.numel();
        Self::from_shape_unchecked(&shape, vec![0.0; numel])
    }

    pub(crate) fn from_shape_unchecked(shape: &Shape, data: Vec<f64>) -> Self {
        debug_assert_eq!(shape.numel(), data.len());
        Self {
            ndim: shape.ndim(),
            shape: shape.padded(),
            stride: padded_strides(shape),
            offset: 0,
            data: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns the number of active axes.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Returns the active dimensions.
    pub fn shape(&self) -> Vec<usize> {
        self.shape[..self.ndim].to_vec()
    }

    /// Returns the size of `axis`. Axes past the rank report 1.
    pub fn dim(&self, axis: usize) -> usize {
        self.shape.get(axis).copied().unwrap_or(1)
    }

    /// Returns the number of elements in the view.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub(crate) fn active_shape(&self) -> Shape {
        Shape::new(self.shape())
    }

    pub(crate) fn padded_shape(&self) -> &[usize; MAX_DIMS] {
        &self.shape
    }

    pub(crate) fn offset_of(&self, index: &[usize; MAX_DIMS]) -> usize {
        self.offset + dot4(index, &self.stride)
    }

    /// Strides of `self` aligned to the trailing axes of a rank-`out_ndim`
    /// result, with 0 on broadcast axes.
    pub(crate) fn broadcast_strides(&self, out_ndim: usize) -> [usize; MAX_DIMS] {
        let mut strides = [0; MAX_DIMS];
        let lead = out_ndim - self.ndim;
        for axis in 0..self.ndim {
            if self.shape[axis] != 1 {
                strides[lead + axis] = self.stride[axis];
            }
        }
        strides
    }

    /// Buffer offset of a padded index under broadcast strides.
    pub(crate) fn offset_of_broadcast(
        &self,
        index: &[usize; MAX_DIMS],
        stride: &[usize; MAX_DIMS],
    ) -> usize {
        self.offset + dot4(index, stride)
    }

    pub(crate) fn scalar_value(&self) -> f64 {
        self.data.read_recursive()[self.offset]
    }

    fn checked_index(&self, index: &[usize]) -> TensorResult<[usize; MAX_DIMS]> {
        let out_of_bounds = || TensorError::IndexOutOfBounds {
            index: index.to_vec(),
            shape: self.shape(),
        };
        if index.len() > MAX_DIMS {
            return Err(out_of_bounds());
        }
        let mut idx = [0; MAX_DIMS];
        for (axis, &i) in index.iter().enumerate() {
            if i >= self.shape[axis] {
                return Err(out_of_bounds());
            }
            idx[axis] = i;
        }
        Ok(idx)
    }

    /// Reads one element. Missing trailing indices are taken as 0.
    pub fn at(&self, index: &[usize]) -> TensorResult<f64> {
        let idx = self.checked_index(index)?;
        Ok(self.data.read_recursive()[self.offset_of(&idx)])
    }

    /// Writes one element, visible through every view of the buffer.
    pub fn set(&mut self, index: &[usize], value: f64) -> TensorResult<()> {
        let idx = self.checked_index(index)?;
        let offset = self.offset_of(&idx);
        self.data.write()[offset] = value;
        Ok(())
    }

    /// Adds `delta` to one element.
    pub fn add_at(&mut self, index: &[usize], delta: f64) -> TensorResult<()> {
        let idx = self.checked_index(index)?;
        let offset = self.offset_of(&idx);
        self.data.write()[offset] += delta;
        Ok(())
    }

    /// Returns a view with the active axes reversed.
    ///
    /// For a rank-2 tensor this is the matrix transpose; for a `[C, H, W]`
    /// tensor it yields `[W, H, C]`.
    pub fn t(&self) -> Tensor {
        let mut ret = self.clone();
        ret.shape[..self.ndim].reverse();
        ret.stride[..self.ndim].reverse();
        ret
    }

    /// Returns whether the view walks its buffer in plain row-major order.
    pub fn is_contiguous(&self) -> bool {
        let natural = self.active_shape().strides();
        (0..self.ndim).all(|axis| self.shape[axis] == 1 || self.stride[axis] == natural[axis])
    }

    /// Returns a view with a new shape over the same elements.
    ///
    /// At most one entry may be `-1`; it is inferred from the element count.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidReshape`] if the view is not contiguous,
    /// if the element count changes, or if the new shape is malformed.
    pub fn reshape(&self, new_shape: &[isize]) -> TensorResult<Tensor> {
        if !self.is_contiguous() {
            return Err(TensorError::InvalidReshape(
                "cannot reshape a non-contiguous view, fork it first".to_string(),
            ));
        }
        if new_shape.is_empty() || new_shape.len() > MAX_DIMS {
            return Err(TensorError::InvalidReshape(format!(
                "expected 1 to {} dimensions, got {:?}",
                MAX_DIMS, new_shape
            )));
        }

        let numel = self.numel();
        let mut inferred = None;
        let mut known = 1usize;
        for (axis, &size) in new_shape.iter().enumerate() {
            match size {
                -1 if inferred.is_none() => inferred = Some(axis),
                s if s > 0 => known *= s as usize,
                _ => {
                    return Err(TensorError::InvalidReshape(format!(
                        "invalid target shape {:?}",
                        new_shape
                    )))
                }
            }
        }

        let mut dims: Vec<usize> = new_shape.iter().map(|&s| s.max(1) as usize).collect();
        match inferred {
            Some(axis) if numel % known == 0 => dims[axis] = numel / known,
            None if known == numel => {}
            _ => {
                return Err(TensorError::InvalidReshape(format!(
                    "cannot reshape {} elements into {:?}",
                    numel, new_shape
                )))
            }
        }

        let shape = Shape::new(dims);
        let mut ret = self.clone();
        ret.ndim = shape.ndim();
        ret.shape = shape.padded();
        ret.stride = padded_strides(&shape);
        Ok(ret)
    }

    /// Returns a view of `len` consecutive entries along axis 0, starting at
    /// `start`.
    pub fn slice(&self, start: usize, len: usize) -> TensorResult<Tensor> {
        if self.ndim == 0 || len == 0 || start + len > self.shape[0] {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![start, len],
                shape: self.shape(),
            });
        }
        let mut ret = self.clone();
        ret.offset += start * self.stride[0];
        ret.shape[0] = len;
        Ok(ret)
    }

    /// Deep copy into a fresh contiguous buffer.
    pub fn fork(&self) -> Tensor {
        Self::from_shape_unchecked(&self.active_shape(), self.to_vec())
    }

    /// Returns `self` if it is already contiguous, a fork otherwise.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            self.clone()
        } else {
            self.fork()
        }
    }

    /// Returns whether two tensors alias the same buffer.
    pub fn shares_buffer(&self, other: &Tensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Collects the elements of the view in row-major order.
    pub fn to_vec(&self) -> Vec<f64> {
        let data = self.data.read_recursive();
        let mut out = Vec::with_capacity(self.numel());
        for_each_index(&self.shape, |idx| out.push(data[self.offset_of(&idx)]));
        out
    }

    /// Overwrites the elements of the view from a row-major slice.
    pub fn copy_from_slice(&mut self, values: &[f64]) -> TensorResult<()> {
        if values.len() != self.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape(),
                got: vec![values.len()],
            });
        }
        let mut data = self.data.write();
        let mut values = values.iter();
        for_each_index(&self.shape, |idx| {
            if let Some(&v) = values.next() {
                data[self.offset_of(&idx)] = v;
            }
        });
        Ok(())
    }

    /// Applies `f` to every element of the view in place.
    pub fn map_in_place<F: Fn(f64) -> f64>(&mut self, f: F) {
        let mut data = self.data.write();
        for_each_index(&self.shape, |idx| {
            let offset = self.offset_of(&idx);
            data[offset] = f(data[offset]);
        });
    }

    /// Returns a new contiguous tensor with `f` applied to every element.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Tensor {
        let values = self.to_vec().into_iter().map(f).collect();
        Self::from_shape_unchecked(&self.active_shape(), values)
    }

    /// Sets every element of the view to `value`.
    pub fn fill(&mut self, value: f64) {
        self.map_in_place(|_| value);
    }

    /// Sets every element of the view to zero.
    pub fn zero(&mut self) {
        self.fill(0.0);
    }

    /// Fills the view with values drawn uniformly from `[-bound, bound]`.
    pub fn uniform(&mut self, bound: f64) -> TensorResult<()> {
        self.uniform_with_seed(bound, DEFAULT_SEED)
    }

    /// Like [`Tensor::uniform`] with an explicit seed.
    pub fn uniform_with_seed(&mut self, bound: f64, seed: u64) -> TensorResult<()> {
        if !(bound >= 0.0 && bound.is_finite()) {
            return Err(TensorError::InvalidArgument(format!(
                "uniform bound must be finite and non-negative, got {}",
                bound
            )));
        }
        let dist = Uniform::new_inclusive(-bound, bound);
        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f64> = (0..self.numel()).map(|_| dist.sample(&mut rng)).collect();
        self.copy_from_slice(&values)
    }

    /// Fills the view with samples of a zero-mean normal distribution with
    /// standard deviation `scale`.
    pub fn gaussian(&mut self, scale: f64) -> TensorResult<()> {
        self.gaussian_with_seed(scale, DEFAULT_SEED)
    }

    /// Like [`Tensor::gaussian`] with an explicit seed.
    pub fn gaussian_with_seed(&mut self, scale: f64, seed: u64) -> TensorResult<()> {
        let dist = Normal::new(0.0, scale).map_err(|e| {
            TensorError::InvalidArgument(format!("gaussian scale {}: {}", scale, e))
        })?;
        let mut rng = StdRng::seed_from_u64(seed);
        let values: Vec<f64> = (0..self.numel()).map(|_| dist.sample(&mut rng)).collect();
        self.copy_from_slice(&values)
    }
}

fn padded_strides(shape: &Shape) -> [usize; MAX_DIMS] {
    let mut stride = [1; MAX_DIMS];
    for (axis, s) in shape.strides().into_iter().enumerate() {
        stride[axis] = s;
    }
    stride
}

impl PartialEq for Tensor {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.to_vec() == other.to_vec()
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("stride", &&self.stride[..self.ndim])
            .field("data", &self.to_vec())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize) -> Tensor {
        let data = (0..rows)
            .flat_map(|i| (0..cols).map(move |j| (i + j) as f64))
            .collect();
        Tensor::from_vec(&[rows, cols], data).unwrap()
    }

    #[test]
    fn test_new_validates_shape_and_data() {
        assert!(Tensor::zeros(&[2, 3]).is_ok());
        assert!(matches!(
            Tensor::zeros(&[2, 0]),
            Err(TensorError::InvalidShape(_))
        ));
        assert!(matches!(
            Tensor::zeros(&[1, 1, 1, 1, 1]),
            Err(TensorError::InvalidShape(_))
        ));
        assert!(matches!(
            Tensor::from_vec(&[2, 2], vec![1.0; 3]),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_scalar() {
        let s = Tensor::scalar(2.5);
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert_eq!(s.at(&[]).unwrap(), 2.5);
    }

    #[test]
    fn test_at_and_set() {
        let mut m = grid(3, 6);
        assert_eq!(m.at(&[2, 5]).unwrap(), 7.0);
        // trailing axes are implicitly size one
        assert_eq!(m.at(&[2, 5, 0, 0]).unwrap(), 7.0);
        assert!(m.at(&[3, 0]).is_err());
        assert!(m.at(&[0, 0, 1]).is_err());

        m.set(&[1, 1], -4.0).unwrap();
        assert_eq!(m.at(&[1, 1]).unwrap(), -4.0);
        m.add_at(&[1, 1], 1.5).unwrap();
        assert_eq!(m.at(&[1, 1]).unwrap(), -2.5);
    }

    #[test]
    fn test_clone_aliases_buffer() {
        let a = grid(2, 2);
        let mut b = a.clone();
        b.set(&[0, 1], 10.0).unwrap();
        assert_eq!(a.at(&[0, 1]).unwrap(), 10.0);
        assert!(a.shares_buffer(&b));
    }

    #[test]
    fn test_fork_detaches_buffer() {
        let mut a = grid(2, 2);
        let mut b = a.fork();
        assert_eq!(a, b);
        b.set(&[0, 1], 10.0).unwrap();
        assert_eq!(a.at(&[0, 1]).unwrap(), 1.0);
        assert!(!a.shares_buffer(&b));

        a.set(&[1, 0], -5.0).unwrap();
        assert_eq!(b.at(&[1, 0]).unwrap(), 1.0);
        assert_eq!(b.at(&[0, 1]).unwrap(), 10.0);
    }

    #[test]
    fn test_transpose_writes_through() {
        let m = grid(3, 6);
        let mut t = m.t();
        assert_eq!(t.shape(), vec![6, 3]);
        assert!(!t.is_contiguous());
        assert_eq!(t.at(&[5, 2]).unwrap(), m.at(&[2, 5]).unwrap());

        t.set(&[3, 0], 42.0).unwrap();
        assert_eq!(m.at(&[0, 3]).unwrap(), 42.0);
        assert_eq!(m.t().t(), m);
    }

    #[test]
    fn test_transpose_reverses_three_axes() {
        let data: Vec<f64> = (0..24).map(|v| v as f64).collect();
        let x = Tensor::from_vec(&[2, 3, 4], data).unwrap();
        let t = x.t();
        assert_eq!(t.shape(), vec![4, 3, 2]);
        assert_eq!(t.at(&[3, 1, 0]).unwrap(), x.at(&[0, 1, 3]).unwrap());
    }

    #[test]
    fn test_reshape() {
        let m = grid(3, 6);
        let a = m.reshape(&[3, 3, 1, 2]).unwrap();
        let b = m.reshape(&[-1, 3, 1, 2]).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.shape(), vec![3, 3, 1, 2]);
        assert!(a.shares_buffer(&m));

        assert!(matches!(
            m.reshape(&[4, 5]),
            Err(TensorError::InvalidReshape(_))
        ));
        assert!(matches!(
            m.reshape(&[-1, -1]),
            Err(TensorError::InvalidReshape(_))
        ));
        assert!(matches!(
            m.t().reshape(&[18]),
            Err(TensorError::InvalidReshape(_))
        ));
        assert_eq!(m.t().fork().reshape(&[18]).unwrap().numel(), 18);
    }

    #[test]
    fn test_slice() {
        let m = grid(4, 2);
        let mut s = m.slice(1, 2).unwrap();
        assert_eq!(s.shape(), vec![2, 2]);
        assert_eq!(s.to_vec(), vec![1.0, 2.0, 2.0, 3.0]);

        s.set(&[0, 0], 9.0).unwrap();
        assert_eq!(m.at(&[1, 0]).unwrap(), 9.0);

        assert!(m.slice(3, 2).is_err());
        assert!(m.slice(0, 0).is_err());
    }

    #[test]
    fn test_contiguous() {
        let m = grid(2, 3);
        assert!(m.contiguous().shares_buffer(&m));
        let t = m.t().contiguous();
        assert!(t.is_contiguous());
        assert!(!t.shares_buffer(&m));
        assert_eq!(t.to_vec(), vec![0.0, 1.0, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_zeros_like_and_fill() {
        let mut m = grid(2, 3);
        let z = m.zeros_like();
        assert_eq!(z.shape(), vec![2, 3]);
        assert_eq!(z.to_vec(), vec![0.0; 6]);
        assert!(!z.shares_buffer(&m));

        m.fill(3.0);
        assert_eq!(m.to_vec(), vec![3.0; 6]);
        m.zero();
        assert_eq!(m.to_vec(), vec![0.0; 6]);
    }

    #[test]
    fn test_map() {
        let m = grid(2, 2);
        let doubled = m.map(|v| v * 2.0);
        assert_eq!(doubled.to_vec(), vec![0.0, 2.0, 2.0, 4.0]);

        let mut t = m.t();
        t.map_in_place(|v| v + 1.0);
        assert_eq!(m.to_vec(), vec![1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_copy_from_slice_through_view() {
        let m = Tensor::zeros(&[2, 2]).unwrap();
        let mut t = m.t();
        t.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(m.to_vec(), vec![1.0, 3.0, 2.0, 4.0]);
        assert!(t.copy_from_slice(&[1.0]).is_err());
    }

    #[test]
    fn test_random_fills_are_reproducible() {
        let mut a = Tensor::zeros(&[4, 5]).unwrap();
        let mut b = Tensor::zeros(&[4, 5]).unwrap();
        a.gaussian(0.1).unwrap();
        b.gaussian(0.1).unwrap();
        assert_eq!(a, b);

        b.gaussian_with_seed(0.1, 7).unwrap();
        assert_ne!(a, b);

        let mut u = Tensor::zeros(&[100]).unwrap();
        u.uniform(0.5).unwrap();
        assert!(u.to_vec().iter().all(|v| v.abs() <= 0.5));

        assert!(u.gaussian(-1.0).is_err());
        assert!(u.uniform(-1.0).is_err());
    }

    #[test]
    fn test_debug_format() {
        let m = grid(1, 2);
        let s = format!("{:?}", m);
        assert!(s.contains("shape: [1, 2]"));
        assert!(s.contains("data: [0.0, 1.0]"));
    }
}
