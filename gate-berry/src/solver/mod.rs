//! 单矩阵低秩 + 稀疏分解 (Robust PCA).
//!
//! 对矩阵 `M` 求解凸优化问题
//!
//! ```text
//! min  ‖L‖* + λ‖S‖₁
//! s.t. L + S = M
//! ```
//!
//! 其中 `‖·‖*` 为核范数 (奇异值之和), `‖·‖₁` 为逐元素绝对值之和.
//! 求解使用交替方向乘子法 (ADMM): 每轮依次对 `L` 做奇异值阈值, 对 `S` 做软阈值,
//! 再更新对偶变量 `Y`. 惩罚参数 `μ` 按原始残差与对偶残差的比值自适应调整.
//! 只有两种残差都低于阈值时才算收敛; 仅满足 `L + S = M` 的点未必是最优点.
//!
//! 问题是正齐次的: 若 `(L, S)` 是 `M` 的解, 则 `(cL, cS)` 是 `cM` 的解 (`c > 0`).
//! 求解前先按最大绝对值归一化, 求解后再缩放回去, 以免极大或极小的数值溢出.
//!
//! 迭代次数受 `max_iters` 限制. 未在限制内收敛不是错误, 此时返回最后一个迭代点,
//! 约束的违反程度体现在 [`Decomposition::residual`] 中.

use ndarray::{ArrayView2, Zip};

use crate::consts::{alm, DEFAULT_TOLERANCE};
use crate::SliceMatrix;

mod prox;

use prox::{frobenius, shrink, spectral_norm, svt};

/// 求解器错误.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolverError {
    /// λ 必须为正有限数.
    #[error("λ 必须为正有限数, 但得到 {0}")]
    InvalidLambda(f64),

    /// 迭代上限必须为正.
    #[error("迭代上限必须为正")]
    InvalidIterations,

    /// 空矩阵. 参数为矩阵形状.
    #[error("矩阵为空, 形状 {0:?}")]
    EmptyMatrix((usize, usize)),

    /// 矩阵包含 NaN 或无穷.
    #[error("矩阵包含非有限值")]
    NonFinite,

    /// 全零矩阵, 问题退化.
    #[error("矩阵全为零, 分解退化")]
    Degenerate,

    /// 求解后端没有产生任何可用的迭代点.
    #[error("求解后端没有产生任何可用的迭代点")]
    NoFeasibleIterate,
}

/// 单个矩阵的分解结果.
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// 低秩分量 L, 与输入同形.
    pub low_rank: SliceMatrix,

    /// 稀疏分量 S, 与输入同形.
    pub sparse: SliceMatrix,

    /// 实际迭代次数.
    pub iterations: usize,

    /// 相对残差 `‖M - L - S‖_F / ‖M‖_F`.
    pub residual: f64,

    /// 相对对偶残差 `μ‖S_k - S_{k-1}‖_F / ‖M‖_F`.
    pub dual_residual: f64,

    /// 原始残差与对偶残差是否都低于收敛阈值.
    pub converged: bool,

    /// L 的数值秩 (最后一次奇异值阈值后非零奇异值个数).
    pub rank: usize,
}

impl Decomposition {
    /// 拆分为 `(L, S)`.
    #[inline]
    pub fn into_parts(self) -> (SliceMatrix, SliceMatrix) {
        (self.low_rank, self.sparse)
    }

    /// `‖S‖₁`.
    #[inline]
    pub fn sparse_l1(&self) -> f64 {
        self.sparse.iter().map(|v| v.abs()).sum()
    }

    /// `‖L‖*`.
    pub fn low_rank_nuclear(&self) -> f64 {
        let (rows, cols) = self.low_rank.dim();
        nalgebra::DMatrix::from_fn(rows, cols, |i, j| self.low_rank[(i, j)])
            .singular_values()
            .sum()
    }
}

/// 低秩 + 稀疏分解求解器. 不含可变状态, 可在多个线程中共享.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LsSolver {
    lambda: f64,
    max_iters: usize,
    tolerance: f64,
}

impl LsSolver {
    /// 以稀疏项权重 `lambda` 和迭代上限 `max_iters` 构建求解器.
    ///
    /// `lambda` 越大, 越多的信号被视为低秩结构而非稀疏扰动.
    pub fn new(lambda: f64, max_iters: usize) -> Result<Self, SolverError> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(SolverError::InvalidLambda(lambda));
        }
        if max_iters == 0 {
            return Err(SolverError::InvalidIterations);
        }
        Ok(Self {
            lambda,
            max_iters,
            tolerance: DEFAULT_TOLERANCE,
        })
    }

    /// 设置收敛阈值 (原始残差与对偶残差共用).
    ///
    /// `tolerance` 必须为正, 否则程序 panic.
    #[inline]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        assert!(tolerance > 0.0, "收敛阈值必须为正");
        self.tolerance = tolerance;
        self
    }

    /// 稀疏项权重 λ.
    #[inline]
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// 迭代上限.
    #[inline]
    pub fn max_iters(&self) -> usize {
        self.max_iters
    }

    /// 收敛阈值.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// 分解 `matrix`.
    ///
    /// # 错误
    ///
    /// 1. 空矩阵, 含非有限值或全零矩阵直接返回错误.
    /// 2. 第一轮迭代就无法完成 (SVD 不收敛或迭代点非有限) 时返回
    ///   [`SolverError::NoFeasibleIterate`]. 之后的轮次出现同样问题时,
    ///   返回上一个可用迭代点.
    pub fn solve(&self, matrix: ArrayView2<f64>) -> Result<Decomposition, SolverError> {
        if matrix.is_empty() {
            return Err(SolverError::EmptyMatrix(matrix.dim()));
        }
        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(SolverError::NonFinite);
        }
        let scale = matrix.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if scale == 0.0 {
            return Err(SolverError::Degenerate);
        }
        let m = matrix.mapv(|v| v / scale);
        let m_fro = frobenius(m.view());

        let lambda = self.lambda;
        let norm_two = spectral_norm(m.view()).ok_or(SolverError::NoFeasibleIterate)?;
        let norm_inf = 1.0 / lambda;

        // 对偶变量初值取可行对偶点, 使第一轮就落在合理尺度上.
        let mut y = m.mapv(|v| v / norm_two.max(norm_inf));
        let mu_0 = alm::MU_SCALE / norm_two;
        let (mu_min, mu_max) = (mu_0 / alm::MU_BOUND_FACTOR, mu_0 * alm::MU_BOUND_FACTOR);
        let mut mu = mu_0;

        let mut low_rank = SliceMatrix::zeros(m.dim());
        let mut sparse = SliceMatrix::zeros(m.dim());
        let mut iterations = 0;
        let mut residual = f64::INFINITY;
        let mut dual_residual = f64::INFINITY;
        let mut rank = 0;
        let mut converged = false;

        for k in 1..=self.max_iters {
            let inv_mu = 1.0 / mu;

            let mut target = &m - &sparse;
            target.scaled_add(inv_mu, &y);
            let Some((next_l, next_rank)) = svt(target.view(), inv_mu) else {
                log::debug!("第 {k} 轮奇异值分解未收敛, 停止迭代");
                break;
            };

            let mut next_s = &m - &next_l;
            next_s.scaled_add(inv_mu, &y);
            let tau = lambda * inv_mu;
            next_s.mapv_inplace(|v| shrink(v, tau));

            if !(next_l.iter().all(|v| v.is_finite()) && next_s.iter().all(|v| v.is_finite())) {
                log::debug!("第 {k} 轮迭代点非有限, 停止迭代");
                break;
            }

            // Z = M - L - S
            let mut z = m.clone();
            Zip::from(&mut z)
                .and(&next_l)
                .and(&next_s)
                .for_each(|z, &l, &s| *z -= l + s);
            let step = &next_s - &sparse;

            residual = frobenius(z.view()) / m_fro;
            dual_residual = mu * frobenius(step.view()) / m_fro;
            y.scaled_add(mu, &z);

            low_rank = next_l;
            sparse = next_s;
            rank = next_rank;
            iterations = k;

            if residual < self.tolerance && dual_residual < self.tolerance {
                converged = true;
                break;
            }

            if residual > alm::BALANCE * dual_residual {
                mu = (mu * alm::MU_STEP).min(mu_max);
            } else if dual_residual > alm::BALANCE * residual {
                mu = (mu / alm::MU_STEP).max(mu_min);
            }
        }

        if iterations == 0 {
            return Err(SolverError::NoFeasibleIterate);
        }
        log::trace!(
            "迭代 {iterations} 次, 相对残差 {residual:.3e}, 对偶残差 {dual_residual:.3e}, 秩 {rank}"
        );

        low_rank.mapv_inplace(|v| v * scale);
        sparse.mapv_inplace(|v| v * scale);
        Ok(Decomposition {
            low_rank,
            sparse,
            iterations,
            residual,
            dual_residual,
            converged,
            rank,
        })
    }
}

/// 以 `lambda` 和 `max_iters` 分解 `matrix`, 返回 `(L, S)`.
///
/// 等价于 `LsSolver::new(lambda, max_iters)?.solve(matrix)`.
pub fn solve(
    matrix: ArrayView2<f64>,
    lambda: f64,
    max_iters: usize,
) -> Result<(SliceMatrix, SliceMatrix), SolverError> {
    Ok(LsSolver::new(lambda, max_iters)?.solve(matrix)?.into_parts())
}
