//! 通用常量.

/// 默认稀疏项权重 λ.
pub const DEFAULT_LAMBDA: f64 = 0.25;

/// 整体分解时每个切片默认的求解迭代上限.
///
/// 整体分解优先吞吐量, 因此默认值很小.
pub const DEFAULT_VOLUME_MAX_ITERS: usize = 5;

/// 默认收敛阈值, 即相对残差 `‖M - L - S‖_F / ‖M‖_F` 的上界.
pub const DEFAULT_TOLERANCE: f64 = 1e-7;

/// 求解器相关常量.
pub mod alm {
    /// μ 的初值为 `MU_SCALE / ‖M‖₂`.
    pub const MU_SCALE: f64 = 1.25;

    /// 原始残差与对偶残差之比超出 `BALANCE` (或低于其倒数) 时调整 μ.
    pub const BALANCE: f64 = 10.0;

    /// 每次调整 μ 时乘或除的倍数.
    pub const MU_STEP: f64 = 2.0;

    /// μ 限制在 `[μ₀ / MU_BOUND_FACTOR, μ₀ * MU_BOUND_FACTOR]` 内.
    pub const MU_BOUND_FACTOR: f64 = 1e7;
}

/// 文件名.
pub mod filename {
    use crate::SliceKey;

    /// 单个 `(z, x)` 切片 CSV 文件名. 该名称只由键决定, 多次运行之间保持稳定.
    #[inline]
    pub fn slice_csv(key: SliceKey) -> String {
        format!("slice_z{}_x{}.csv", key.z, key.x)
    }

    /// 低秩分量在时间点 `t` 的 NIFTI 文件名.
    #[inline]
    pub fn low_rank_nifti(t: usize) -> String {
        format!("C{t}_3D_L.nii.gz")
    }

    /// 稀疏分量在时间点 `t` 的 NIFTI 文件名.
    #[inline]
    pub fn sparse_nifti(t: usize) -> String {
        format!("C{t}_3D_S.nii.gz")
    }

    /// 第 `i` 个时间主成分的 NIFTI 文件名.
    #[inline]
    pub fn component_nifti(i: usize) -> String {
        format!("C{i}_3D.nii.gz")
    }

    /// 时间主成分奇异值文件名.
    pub const SINGULAR_VALUES: &str = "singular_values.npy";
}
