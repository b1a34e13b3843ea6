//! 4D 体数据 -> `(z, x)` 切片矩阵集合.

use std::ops::Range;

use ndarray::{Array2, Axis};

use crate::slice::key_space;
use crate::{MatrixCollection, Volume4D, VolumeError, VolumeResult};

/// 检查 `z_range` 并补全默认值 (全部 z).
pub(crate) fn resolve_z_range(z_range: Option<Range<usize>>, len_z: usize) -> VolumeResult<Range<usize>> {
    let range = z_range.unwrap_or(0..len_z);
    if range.is_empty() || range.end > len_z {
        return Err(VolumeError::ZRangeOutOfBounds {
            start: range.start,
            end: range.end,
            len_z,
        });
    }
    Ok(range)
}

/// 将 4D 体数据重排为以 `(z, x)` 为键的矩阵集合.
///
/// 对 `z_range` (缺省为全部 z) 与 `[0, X)` 内的每个 `(z, x)`, 生成形状为 `(Y, T)` 的矩阵,
/// 第 `t` 列取自插入顺序下第 `t` 个时间点在 `(z, x)` 处沿 y 的体素行.
///
/// 该操作只读取输入.
///
/// # 错误
///
/// 1. `volume` 不含时间点时返回 [`VolumeError::Empty`].
/// 2. `z_range` 为空或越界时返回 [`VolumeError::ZRangeOutOfBounds`].
pub fn reshape(volume: &Volume4D, z_range: Option<Range<usize>>) -> VolumeResult<MatrixCollection> {
    if volume.is_empty() {
        return Err(VolumeError::Empty);
    }
    let shape = volume.shape();
    let z_range = resolve_z_range(z_range, shape.z)?;
    let t_dim = volume.len_t();

    let collection = key_space(z_range, shape.x)
        .map(|key| {
            let mut m = Array2::<f64>::zeros((shape.y, t_dim));
            for (mut column, (_, frame)) in m.axis_iter_mut(Axis(1)).zip(volume.iter()) {
                column.assign(&frame.slice(ndarray::s![key.z, key.x, ..]));
            }
            (key, m)
        })
        .collect();
    Ok(collection)
}
