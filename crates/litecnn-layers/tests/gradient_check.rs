//! Central-difference checks of every hand-written backward pass.

use litecnn_layers::prelude::*;

const H: f64 = 1e-4;

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for axis in (0..shape.len()).rev() {
        index[axis] = flat % shape[axis];
        flat /= shape[axis];
    }
    index
}

/// Perturbs each element of `target` (a view aliasing whatever `f` reads)
/// and returns the central-difference gradient of `f`.
fn numeric_grad(target: &Tensor, f: impl Fn() -> f64) -> Tensor {
    let mut target = target.clone();
    let shape = target.shape();
    let mut grad = target.zeros_like();
    for flat in 0..target.numel() {
        let index = unravel(flat, &shape);
        let original = target.at(&index).unwrap();
        target.set(&index, original + H).unwrap();
        let plus = f();
        target.set(&index, original - H).unwrap();
        let minus = f();
        target.set(&index, original).unwrap();
        grad.set(&index, (plus - minus) / (2.0 * H)).unwrap();
    }
    grad
}

fn gaussian(shape: &[usize], seed: u64) -> Tensor {
    let mut t = Tensor::zeros(shape).unwrap();
    t.gaussian_with_seed(1.0, seed).unwrap();
    t
}

/// Distinct values spaced far wider than the finite-difference step.
fn spaced(shape: &[usize]) -> Tensor {
    let n: usize = shape.iter().product();
    let data = (0..n).map(|i| ((i * 7919) % n) as f64 * 0.1 - 1.0).collect();
    Tensor::from_vec(shape, data).unwrap()
}

fn projected<L: Layer>(layer: &L, x: &Tensor, dout: &Tensor) -> f64 {
    layer.forward(x).unwrap().mul(dout).unwrap().sum()
}

fn assert_close(analytic: &Tensor, numeric: &Tensor, tol: f64) {
    let diff = analytic.max_abs_diff(numeric).unwrap();
    assert!(diff < tol, "max diff {} exceeds {}", diff, tol);
}

#[test]
fn affine_gradients_match_numeric() {
    let cases: [(usize, usize, usize); 3] = [(4, 5, 3), (1, 7, 2), (6, 3, 4)];
    for (seed, (batch, inputs, outputs)) in cases.into_iter().enumerate() {
        let seed = seed as u64 * 10;
        let mut layer = Affine::new(inputs, outputs, 1.0).unwrap();
        let x = gaussian(&[batch, inputs], seed + 3);
        let dout = gaussian(&[batch, outputs], seed + 5);

        layer.forward_train(&x).unwrap();
        let dx = layer.backward(&dout).unwrap();
        let dw = layer.weights_grad().unwrap().clone();
        let db = layer.bias_grad().unwrap().clone();

        assert_close(&dx, &numeric_grad(&x, || projected(&layer, &x, &dout)), 1e-6);
        let w = layer.weights().clone();
        assert_close(&dw, &numeric_grad(&w, || projected(&layer, &x, &dout)), 1e-6);
        let b = layer.bias().clone();
        assert_close(&db, &numeric_grad(&b, || projected(&layer, &x, &dout)), 1e-6);
    }
}

#[test]
fn affine_regularized_weight_gradient_matches_numeric() {
    let mut layer = Affine::new(4, 2, 1.0)
        .unwrap()
        .with_kernel_regularizer(Regularizer::L2(0.3));
    let x = gaussian(&[3, 4], 11);
    let dout = gaussian(&[3, 2], 12);

    layer.forward_train(&x).unwrap();
    layer.backward(&dout).unwrap();
    let dw = layer.weights_grad().unwrap().clone();

    let w = layer.weights().clone();
    let numeric = numeric_grad(&w, || {
        projected(&layer, &x, &dout) + layer.regularization_loss()
    });
    assert_close(&dw, &numeric, 1e-6);
}

#[test]
fn relu_gradient_matches_numeric() {
    let shapes: [&[usize]; 4] = [&[3, 4, 2], &[1, 5], &[2, 3, 3, 4], &[7]];
    for (seed, shape) in shapes.into_iter().enumerate() {
        let seed = seed as u64 * 10;
        let mut layer = Relu::new();
        let x = gaussian(shape, seed + 21).map(|v| if v.abs() < 0.01 { 0.5 } else { v });
        let dout = gaussian(shape, seed + 22);

        layer.forward_train(&x).unwrap();
        let dx = layer.backward(&dout).unwrap();
        assert_close(&dx, &numeric_grad(&x, || projected(&layer, &x, &dout)), 1e-6);
    }
}

#[test]
fn maxpool_gradient_matches_numeric() {
    let overlapping = MaxPoolConfig {
        pool_height: 3,
        pool_width: 3,
        stride: 2,
    };
    let gapped = MaxPoolConfig {
        pool_height: 2,
        pool_width: 2,
        stride: 3,
    };
    let cases: [(MaxPoolConfig, &[usize]); 6] = [
        (MaxPoolConfig::default(), &[2, 2, 5, 4]),
        // odd extents leave a clipped window on both pooled axes
        (MaxPoolConfig::default(), &[1, 3, 7, 3]),
        (MaxPoolConfig::default(), &[5, 7]),
        (overlapping, &[2, 1, 7, 6]),
        (gapped, &[1, 2, 8, 7]),
        (gapped, &[4, 5]),
    ];
    for (seed, (config, shape)) in cases.into_iter().enumerate() {
        let mut layer = MaxPool::new(config).unwrap();
        let x = spaced(shape);
        let y = layer.forward_train(&x).unwrap();
        let dout = gaussian(&y.shape(), 31 + seed as u64);

        let dx = layer.backward(&dout).unwrap();
        assert_eq!(dx.shape(), x.shape());
        assert_close(&dx, &numeric_grad(&x, || projected(&layer, &x, &dout)), 1e-6);
    }
}

#[test]
fn conv_gradients_match_numeric() {
    let configs = [
        ConvConfig::same(3, 2, 3),
        ConvConfig {
            filter_height: 3,
            filter_width: 2,
            in_channels: 2,
            out_filters: 2,
            stride: 2,
            padding: 1,
        },
        ConvConfig {
            filter_height: 2,
            filter_width: 2,
            in_channels: 2,
            out_filters: 1,
            stride: 3,
            padding: 0,
        },
    ];
    let shapes: [[usize; 4]; 3] = [[2, 2, 5, 6], [1, 2, 4, 3], [3, 2, 7, 5]];
    for (i, config) in configs.into_iter().enumerate() {
        for (j, shape) in shapes.iter().enumerate() {
            let seed = (i * 10 + j) as u64 * 2;
            let mut layer = Conv::new(config, Initializer::Gaussian(1.0)).unwrap();
            let x = gaussian(shape, seed + 41);
            let y = layer.forward_train(&x).unwrap();
            let dout = gaussian(&y.shape(), seed + 42);

            let dx = layer.backward(&dout).unwrap();
            let dw = layer.weights_grad().unwrap().clone();
            let db = layer.bias_grad().unwrap().clone();

            assert_eq!(dx.shape(), x.shape());
            assert_close(&dx, &numeric_grad(&x, || projected(&layer, &x, &dout)), 1e-6);
            let w = layer.weights().clone();
            assert_close(&dw, &numeric_grad(&w, || projected(&layer, &x, &dout)), 1e-6);
            let b = layer.bias().clone();
            assert_close(&db, &numeric_grad(&b, || projected(&layer, &x, &dout)), 1e-6);
        }
    }
}

#[test]
fn softmax_loss_gradient_matches_numeric() {
    let scores = gaussian(&[5, 4], 51);
    let labels: [usize; 5] = [0, 3, 1, 1, 2];
    let (_, dscores) = softmax_loss(&scores, &labels).unwrap();
    let numeric = numeric_grad(&scores, || softmax_loss(&scores, &labels).unwrap().0);
    assert_close(&dscores, &numeric, 1e-7);
}
