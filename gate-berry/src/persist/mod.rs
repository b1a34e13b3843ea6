//! 分解结果的持久化.
//!
//! 每个 `(z, x)` 矩阵保存为一个无表头 CSV 文件 (`slice_z{z}_x{x}.csv`), 行对应 y, 列对应 t.
//! 读回的矩阵可以重新拼装为逐时间点的 4D 体数据.

use std::path::PathBuf;

use crate::{Idx2d, SliceKey};

mod assemble;
mod csv_io;

pub use assemble::to_volume4d;
pub use csv_io::{export, import};

/// 持久化运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// 导入时缺少某个切片文件.
    #[error("缺少切片 {key} 的文件 `{}`", path.display())]
    MissingSlice {
        /// 缺失的切片.
        key: SliceKey,
        /// 期望的文件路径.
        path: PathBuf,
    },

    /// 切片矩阵的形状与目标体数据不符.
    #[error("切片 {key} 的形状为 {found:?}, 但期望 {expected:?}")]
    SliceShape {
        /// 出错的切片.
        key: SliceKey,
        /// 期望形状 `(Y, T)`.
        expected: Idx2d,
        /// 实际形状.
        found: Idx2d,
    },

    /// CSV 格式错误 (例如各行长度不一).
    #[error("解析 `{}` 失败: {source}", path.display())]
    Csv {
        /// 出错的文件.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: csv::Error,
    },

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
