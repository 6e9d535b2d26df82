//! Arithmetic, reductions and products on [`Tensor`].
//!
//! Binary operations broadcast: the shapes are aligned from the trailing
//! axis, missing leading axes count as 1, and an axis of size 1 on either
//! side is repeated to match the other.

use std::ops::{Add, Div, Mul, Sub};

use crate::shape::{Shape, MAX_DIMS};
use crate::tensor::{dot4, for_each_index};
use crate::{Tensor, TensorError, TensorResult};

impl Tensor {
    fn broadcast_shape(&self, rhs: &Tensor) -> TensorResult<Shape> {
        self.active_shape()
            .broadcast_with(&rhs.active_shape())
            .ok_or_else(|| TensorError::ShapeMismatch {
                expected: self.shape(),
                got: rhs.shape(),
            })
    }

    /// Combines two tensors elementwise after broadcasting them to a common
    /// shape, producing a new contiguous tensor.
    pub fn zip_with<F: Fn(f64, f64) -> f64>(&self, rhs: &Tensor, op: F) -> TensorResult<Tensor> {
        let out_shape = self.broadcast_shape(rhs)?;
        let ndim = out_shape.ndim();
        let (sa, sb) = (self.broadcast_strides(ndim), rhs.broadcast_strides(ndim));

        let a = self.data.read_recursive();
        let b = rhs.data.read_recursive();
        let mut out = Vec::with_capacity(out_shape.numel());
        for_each_index(&out_shape.padded(), |idx| {
            let x = a[self.offset_of_broadcast(&idx, &sa)];
            let y = b[rhs.offset_of_broadcast(&idx, &sb)];
            out.push(op(x, y));
        });
        drop(a);
        drop(b);

        Ok(Tensor::from_shape_unchecked(&out_shape, out))
    }

    /// Updates `self` in place with `op(self, rhs)`. `rhs` must broadcast to
    /// the shape of `self`.
    ///
    /// If `rhs` aliases the buffer of `self` it is forked first, so the update
    /// always reads the values from before the call.
    pub fn zip_with_assign<F: Fn(f64, f64) -> f64>(
        &mut self,
        rhs: &Tensor,
        op: F,
    ) -> TensorResult<()> {
        let out_shape = self.broadcast_shape(rhs)?;
        if out_shape.as_slice() != self.shape().as_slice() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape(),
                got: out_shape.into_vec(),
            });
        }

        let rhs = if self.shares_buffer(rhs) {
            rhs.fork()
        } else {
            rhs.clone()
        };
        let sb = rhs.broadcast_strides(self.ndim());

        let b = rhs.data.read_recursive();
        let mut a = self.data.write();
        for_each_index(self.padded_shape(), |idx| {
            let offset = self.offset_of(&idx);
            a[offset] = op(a[offset], b[rhs.offset_of_broadcast(&idx, &sb)]);
        });
        Ok(())
    }

    /// Elementwise sum with broadcasting.
    pub fn add(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.zip_with(rhs, |a, b| a + b)
    }

    /// Elementwise difference with broadcasting.
    pub fn sub(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.zip_with(rhs, |a, b| a - b)
    }

    /// Elementwise product with broadcasting.
    pub fn mul(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.zip_with(rhs, |a, b| a * b)
    }

    /// Elementwise quotient with broadcasting.
    pub fn div(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        self.zip_with(rhs, |a, b| a / b)
    }

    /// In-place `self += rhs`.
    pub fn add_assign(&mut self, rhs: &Tensor) -> TensorResult<()> {
        self.zip_with_assign(rhs, |a, b| a + b)
    }

    /// In-place `self -= rhs`.
    pub fn sub_assign(&mut self, rhs: &Tensor) -> TensorResult<()> {
        self.zip_with_assign(rhs, |a, b| a - b)
    }

    /// In-place `self *= rhs`.
    pub fn mul_assign(&mut self, rhs: &Tensor) -> TensorResult<()> {
        self.zip_with_assign(rhs, |a, b| a * b)
    }

    /// In-place `self /= rhs`.
    pub fn div_assign(&mut self, rhs: &Tensor) -> TensorResult<()> {
        self.zip_with_assign(rhs, |a, b| a / b)
    }

    /// Adds a scalar to every element.
    pub fn add_scalar(&self, scalar: f64) -> Tensor {
        self.map(|v| v + scalar)
    }

    /// Subtracts a scalar from every element.
    pub fn sub_scalar(&self, scalar: f64) -> Tensor {
        self.map(|v| v - scalar)
    }

    /// Multiplies every element by a scalar.
    pub fn mul_scalar(&self, scalar: f64) -> Tensor {
        self.map(|v| v * scalar)
    }

    /// Divides every element by a scalar.
    pub fn div_scalar(&self, scalar: f64) -> Tensor {
        self.map(|v| v / scalar)
    }

    /// In-place scalar multiplication.
    pub fn scale_in_place(&mut self, scalar: f64) {
        self.map_in_place(|v| v * scalar);
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        let data = self.data.read_recursive();
        let mut total = 0.0;
        for_each_index(self.padded_shape(), |idx| total += data[self.offset_of(&idx)]);
        total
    }

    /// Largest element.
    pub fn max(&self) -> f64 {
        let data = self.data.read_recursive();
        let mut best = f64::NEG_INFINITY;
        for_each_index(self.padded_shape(), |idx| {
            best = best.max(data[self.offset_of(&idx)]);
        });
        best
    }

    /// Sums along one axis and removes it. Negative axes count from the end.
    ///
    /// Summing the only axis of a rank-1 tensor yields a rank-0 scalar.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidAxis`] if `dim` is outside the rank.
    pub fn sum_dim(&self, dim: isize) -> TensorResult<Tensor> {
        let ndim = self.ndim() as isize;
        let axis = if dim < 0 { dim + ndim } else { dim };
        if axis < 0 || axis >= ndim {
            return Err(TensorError::InvalidAxis {
                axis: dim,
                ndim: self.ndim(),
            });
        }
        let axis = axis as usize;

        let mut dims = self.shape();
        dims.remove(axis);
        let out_shape = Shape::new(dims);
        let out_strides = out_shape.strides();

        let mut mapped = [0; MAX_DIMS];
        for a in 0..self.ndim() {
            if a < axis {
                mapped[a] = out_strides[a];
            } else if a > axis {
                mapped[a] = out_strides[a - 1];
            }
        }

        let mut out = vec![0.0; out_shape.numel()];
        let data = self.data.read_recursive();
        for_each_index(self.padded_shape(), |idx| {
            out[dot4(&idx, &mapped)] += data[self.offset_of(&idx)];
        });
        drop(data);

        Ok(Tensor::from_shape_unchecked(&out_shape, out))
    }

    /// Largest absolute elementwise difference between two same-shaped
    /// tensors.
    pub fn max_abs_diff(&self, other: &Tensor) -> TensorResult<f64> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: self.shape(),
                got: other.shape(),
            });
        }
        Ok(self
            .to_vec()
            .iter()
            .zip(other.to_vec().iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max))
    }

    /// Tensor product.
    ///
    /// - rank 0 with anything scales the other operand;
    /// - rank 1 with rank 1 is the inner product, returned with shape `[1]`;
    /// - rank 2 with rank 2 is the matrix product.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::ShapeMismatch`] when inner dimensions disagree
    /// and [`TensorError::UnsupportedOperation`] for any other rank pairing.
    pub fn dot(&self, rhs: &Tensor) -> TensorResult<Tensor> {
        match (self.ndim(), rhs.ndim()) {
            (0, _) => Ok(rhs.mul_scalar(self.scalar_value())),
            (_, 0) => Ok(self.mul_scalar(rhs.scalar_value())),
            (1, 1) => {
                if self.dim(0) != rhs.dim(0) {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape(),
                        got: rhs.shape(),
                    });
                }
                let inner = self
                    .to_vec()
                    .iter()
                    .zip(rhs.to_vec().iter())
                    .map(|(a, b)| a * b)
                    .sum();
                Ok(Tensor::from_shape_unchecked(&Shape::new(vec![1]), vec![inner]))
            }
            (2, 2) => {
                let (m, k, n) = (self.dim(0), self.dim(1), rhs.dim(1));
                if rhs.dim(0) != k {
                    return Err(TensorError::ShapeMismatch {
                        expected: vec![k, n],
                        got: rhs.shape(),
                    });
                }
                let a = self.to_vec();
                let b = rhs.to_vec();
                let mut out = vec![0.0; m * n];
                for i in 0..m {
                    let row = &mut out[i * n..(i + 1) * n];
                    for l in 0..k {
                        let av = a[i * k + l];
                        for (o, bv) in row.iter_mut().zip(&b[l * n..(l + 1) * n]) {
                            *o += av * bv;
                        }
                    }
                }
                Ok(Tensor::from_shape_unchecked(&Shape::new(vec![m, n]), out))
            }
            (l, r) => Err(TensorError::UnsupportedOperation(format!(
                "dot between rank-{} and rank-{} tensors",
                l, r
            ))),
        }
    }
}

impl Add<f64> for &Tensor {
    type Output = Tensor;

    fn add(self, rhs: f64) -> Tensor {
        self.add_scalar(rhs)
    }
}

impl Sub<f64> for &Tensor {
    type Output = Tensor;

    fn sub(self, rhs: f64) -> Tensor {
        self.sub_scalar(rhs)
    }
}

impl Mul<f64> for &Tensor {
    type Output = Tensor;

    fn mul(self, rhs: f64) -> Tensor {
        self.mul_scalar(rhs)
    }
}

impl Div<f64> for &Tensor {
    type Output = Tensor;

    fn div(self, rhs: f64) -> Tensor {
        self.div_scalar(rhs)
    }
}
