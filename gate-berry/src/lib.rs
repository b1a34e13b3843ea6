#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对呼吸门控 4D 医学影像 (按采集时间分组的 3D 体数据) 做逐切片的
//! 低秩 + 稀疏 (Low-Rank + Sparse, L+S) 分解, 并负责分解结果的持久化与体数据重建.
//!
//! # 数据流
//!
//! ```text
//! Volume4D --reshape--> MatrixCollection --decompose--> (L, S)
//!     --export--> CSV --import--> MatrixCollection --to_volume4d--> ReconstructedVolume4D
//! ```
//!
//! 1. [`reshape`] 将 `时间点 -> (Z, X, Y)` 的体数据重排为以 `(z, x)` 为键的
//!   `(Y, T)` 矩阵集合.
//! 2. [`solver`] 对单个矩阵 `M` 求解
//!   `min ‖L‖* + λ‖S‖₁  s.t.  L + S = M`.
//! 3. [`decompose`] 在线程池上对所有 `(z, x)` 矩阵独立求解.
//! 4. [`persist`] 负责 CSV 导出/导入, 以及将矩阵集合重新拼装为 4D 体数据.
//!
//! # 注意
//!
//! 1. 所有形状都通过参数显式传递 (见 [`VolumeShape`]), 库内没有任何硬编码的体数据尺寸.
//! 2. 单个切片求解失败会使整个分解失败, 并携带出错的 [`SliceKey`].
//!   部分填充的结果集合重建后会静默地补零, 因此不允许返回.
//!
//! # 附加功能
//!
//! ### NIFTI 读写 ✅
//!
//! 从目录读取逐时间点的 nii 文件, 以及逐时间点写出重建结果.
//!
//! 实现位于 `gate-berry/src/volume/nifti_io.rs`.
//!
//! ### 采集时间排序 ✅
//!
//! 解析 DICOM `AcquisitionDateTime`, 并按采集时间对时间点重新排序.
//!
//! 实现位于 `gate-berry/src/volume/acquisition.rs`.
//!
//! ### 全局时间主成分 ✅
//!
//! 把每个时间点展平为一行, 求 thin SVD 得到时间主成分体数据.
//!
//! 实现位于 `gate-berry/src/components.rs`.

/// 二维索引 `(z, x)`, 用于定位一条沿 y 方向的体素行.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, x, y)`.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

mod volume;

pub use volume::{
    acquisition_millis, time_differences, ComponentKind, ReconstructedVolume4D, Volume4D,
    VolumeError, VolumeResult, VolumeShape,
};

mod slice;

pub use slice::{key_space, MatrixCollection, SliceKey, SliceMatrix};

pub mod reshape;

pub mod solver;

pub mod decompose;

pub mod persist;

pub mod components;

pub mod prelude;
