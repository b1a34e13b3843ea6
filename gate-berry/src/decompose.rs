//! 整个 4D 体数据的逐切片分解.
//!
//! 每个 `(z, x)` 矩阵独立求解, 互不共享可变状态. 启用 `rayon` 特性时在固定大小的线程池上并行求解,
//! 否则按键顺序串行求解. 两种方式的结果完全一致.

use std::ops::Range;
use std::time::Instant;

use crate::solver::{Decomposition, LsSolver, SolverError};
use crate::{MatrixCollection, SliceKey, SliceMatrix, Volume4D, VolumeError};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use std::sync::atomic::{AtomicBool, Ordering};
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 体数据分解错误.
#[derive(Debug, thiserror::Error)]
pub enum DecomposeError {
    /// 输入体数据或 z 范围不合法.
    #[error(transparent)]
    Volume(#[from] VolumeError),

    /// 某个切片求解失败. 整个分解随之失败, 不返回部分结果.
    #[error("切片 {key} 分解失败: {source}")]
    Solver {
        /// 出错的切片.
        key: SliceKey,
        /// 求解器错误.
        #[source]
        source: SolverError,
    },

    /// 求解参数不合法.
    #[error("求解参数不合法: {0}")]
    Config(SolverError),

    /// 无法创建线程池.
    #[error("无法创建 {workers} 个工作线程: {reason}")]
    ThreadPool {
        /// 请求的线程数.
        workers: usize,
        /// 底层错误描述.
        reason: String,
    },
}

impl DecomposeError {
    /// 出错切片的键 (若有).
    pub fn slice_key(&self) -> Option<SliceKey> {
        match self {
            Self::Solver { key, .. } => Some(*key),
            _ => None,
        }
    }
}

/// 本机可用的并行度, 至少为 1. 工作线程数配置为 0 时取该值.
pub fn available_workers() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get().max(1), usize::from)
}

/// 4D 体数据分解器.
///
/// 同一求解器配置被所有切片共享.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeDecomposer {
    solver: LsSolver,
    workers: usize,
}

impl VolumeDecomposer {
    /// 以求解器 `solver` 构建分解器, 工作线程数默认为本机核心数.
    pub fn new(solver: LsSolver) -> Self {
        Self {
            solver,
            workers: available_workers(),
        }
    }

    /// 设置工作线程数. 传入 0 时使用本机核心数.
    ///
    /// 未启用 `rayon` 特性时该设置不起作用.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 {
            available_workers()
        } else {
            workers
        };
        self
    }

    /// 求解器配置.
    #[inline]
    pub fn solver(&self) -> &LsSolver {
        &self.solver
    }

    /// 工作线程数.
    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 分解 `volume` 中 `z_range` (缺省为全部 z) 内的所有切片, 返回 `(低秩, 稀疏)` 两个集合.
    ///
    /// 两个集合的键空间与重排后的输入完全一致, 每个矩阵与对应输入同形.
    ///
    /// # 错误
    ///
    /// 1. 体数据为空或 z 范围不合法时返回 [`DecomposeError::Volume`].
    /// 2. 任一切片求解失败时返回 [`DecomposeError::Solver`], 其中携带该切片的键.
    pub fn decompose_volume(
        &self,
        volume: &Volume4D,
        z_range: Option<Range<usize>>,
    ) -> Result<(MatrixCollection, MatrixCollection), DecomposeError> {
        let input = crate::reshape::reshape(volume, z_range)?;
        self.decompose_collection(&input)
    }

    /// 分解已经重排好的矩阵集合.
    pub fn decompose_collection(
        &self,
        input: &MatrixCollection,
    ) -> Result<(MatrixCollection, MatrixCollection), DecomposeError> {
        let start = Instant::now();
        log::info!(
            "开始分解 {} 个切片 (λ = {}, 迭代上限 {}, {} 个工作线程)",
            input.len(),
            self.solver.lambda(),
            self.solver.max_iters(),
            self.workers
        );

        let solved = self.run(input)?;

        let unconverged = solved.iter().filter(|(_, d)| !d.converged).count();
        if unconverged > 0 {
            log::info!("{unconverged} 个切片在迭代上限内未收敛, 使用最后一次迭代的结果");
        }
        log::info!("分解完成, 用时 {:.2?}", start.elapsed());

        let (low_rank, sparse) = solved
            .into_iter()
            .map(|(key, d)| {
                let (l, s) = d.into_parts();
                ((key, l), (key, s))
            })
            .unzip();
        Ok((low_rank, sparse))
    }

    fn solve_one(&self, key: SliceKey, matrix: &SliceMatrix) -> Result<Decomposition, DecomposeError> {
        let ans = self.solver.solve(matrix.view()).map_err(|source| {
            log::error!("切片 {key} 分解失败: {source}");
            DecomposeError::Solver { key, source }
        })?;
        log::debug!(
            "切片 {key}: {} 次迭代, 残差 {:.3e}, 秩 {}",
            ans.iterations,
            ans.residual,
            ans.rank
        );
        Ok(ans)
    }

    #[cfg(feature = "rayon")]
    fn run(&self, input: &MatrixCollection) -> Result<Vec<(SliceKey, Decomposition)>, DecomposeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| DecomposeError::ThreadPool {
                workers: self.workers,
                reason: e.to_string(),
            })?;

        // 收集到 `Result` 时, 第一个错误会阻止新任务被调度;
        // 已被工作线程取走的任务则通过 `cancelled` 直接跳过.
        let cancelled = AtomicBool::new(false);
        let jobs: Vec<(&SliceKey, &SliceMatrix)> = input.iter().collect();
        let solved = pool.install(|| {
            jobs.into_par_iter()
                .map(|(&key, m)| {
                    if cancelled.load(Ordering::Acquire) {
                        return Ok(None);
                    }
                    match self.solve_one(key, m) {
                        Ok(d) => Ok(Some((key, d))),
                        Err(e) => {
                            cancelled.store(true, Ordering::Release);
                            Err(e)
                        }
                    }
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(solved.into_iter().flatten().collect())
    }

    #[cfg(not(feature = "rayon"))]
    fn run(&self, input: &MatrixCollection) -> Result<Vec<(SliceKey, Decomposition)>, DecomposeError> {
        input
            .iter()
            .map(|(&key, m)| self.solve_one(key, m).map(|d| (key, d)))
            .collect()
    }
}

/// 以 `lambda` 和 `max_iters` 分解 `volume` 的 `z_range` 部分, 工作线程数取本机核心数.
pub fn decompose_volume(
    volume: &Volume4D,
    lambda: f64,
    max_iters: usize,
    z_range: Option<Range<usize>>,
) -> Result<(MatrixCollection, MatrixCollection), DecomposeError> {
    let solver = LsSolver::new(lambda, max_iters).map_err(DecomposeError::Config)?;
    VolumeDecomposer::new(solver).decompose_volume(volume, z_range)
}
