//! 近端算子: 奇异值阈值 (核范数) 与软阈值 (L1 范数).
//!
//! SVD 由 `nalgebra` 完成, 这里负责和 `ndarray` 之间的转换.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

#[inline]
fn to_dmatrix(a: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = a.dim();
    DMatrix::from_fn(rows, cols, |i, j| a[(i, j)])
}

#[inline]
fn from_dmatrix(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Frobenius 范数. 先按最大绝对值缩放再求平方和, 元素接近 `f64::MAX` 时也不会溢出.
pub(crate) fn frobenius(a: ArrayView2<f64>) -> f64 {
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return scale;
    }
    scale * a.iter().map(|v| (v / scale).powi(2)).sum::<f64>().sqrt()
}

/// 谱范数 (最大奇异值). SVD 不收敛时返回 `None`.
pub(crate) fn spectral_norm(a: ArrayView2<f64>) -> Option<f64> {
    let svd = to_dmatrix(a).try_svd(false, false, f64::EPSILON, 0)?;
    Some(svd.singular_values.max())
}

/// 奇异值阈值算子 `U · max(Σ - tau, 0) · Vᵀ`, 即 `tau · ‖·‖*` 的近端算子.
///
/// 同时返回阈值后非零奇异值的个数. SVD 不收敛时返回 `None`.
pub(crate) fn svt(a: ArrayView2<f64>, tau: f64) -> Option<(Array2<f64>, usize)> {
    let mut svd = to_dmatrix(a).try_svd(true, true, f64::EPSILON, 0)?;
    let mut rank = 0;
    svd.singular_values.apply(|s| {
        *s = (*s - tau).max(0.0);
        if *s > 0.0 {
            rank += 1;
        }
    });
    let recomposed = svd.recompose().ok()?;
    Some((from_dmatrix(&recomposed), rank))
}

/// 软阈值, 即 `tau · |·|` 的近端算子.
#[inline]
pub(crate) fn shrink<T: num::Float>(x: T, tau: T) -> T {
    x.signum() * (x.abs() - tau).max(T::zero())
}
