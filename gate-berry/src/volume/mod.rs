//! 4D 体数据: 时间点 -> 3D 体数据 `(Z, X, Y)`.

use std::ops::Index;
use std::path::PathBuf;

use ndarray::{Array3, ArrayView3};

use crate::{Idx3d, SliceKey};

mod acquisition;
mod nifti_io;

pub use acquisition::{acquisition_millis, time_differences};
pub(crate) use nifti_io::write_nifti_3d;

/// 体数据运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    /// 4D 体数据不含任何时间点.
    #[error("4D 体数据为空, 不含任何时间点")]
    Empty,

    /// 某时间点的空间形状与其他时间点不一致.
    #[error("时间点 `{time_point}` 的形状为 {found:?}, 但期望 {expected:?}")]
    ShapeMismatch {
        /// 出错的时间点.
        time_point: String,
        /// 体数据约定的形状 `(Z, X, Y)`.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 时间点重复.
    #[error("时间点 `{0}` 重复")]
    DuplicateTimePoint(String),

    /// 请求的 z 范围为空或越界.
    #[error("z 范围 {start}..{end} 为空或超出 [0, {len_z})")]
    ZRangeOutOfBounds {
        /// 起点.
        start: usize,
        /// 终点 (不含).
        end: usize,
        /// 体数据的 z 方向长度.
        len_z: usize,
    },

    /// nii 文件去除多余单例维度后仍不是 3D 数据.
    #[error("`{}` 不是 3D 体数据 (维数 {ndim})", path.display())]
    NotThreeDimensional {
        /// 文件路径.
        path: PathBuf,
        /// 实际维数.
        ndim: usize,
    },

    /// 时间主成分的特征分解失败.
    #[error("时间主成分的特征分解未收敛")]
    Eigen,

    /// nii 文件读写错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// npy 文件写入错误.
    #[error(transparent)]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// 其他底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// 体数据操作结果.
pub type VolumeResult<T> = Result<T, VolumeError>;

/// 3D 体数据的形状描述, 即 `(Z, X, Y)`.
///
/// 同一个 [`Volume4D`] 的所有时间点共享同一形状.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VolumeShape {
    /// 水平切片个数.
    pub z: usize,

    /// 切片行数.
    pub x: usize,

    /// 切片列数.
    pub y: usize,
}

impl VolumeShape {
    /// 构造形状描述.
    #[inline]
    pub const fn new(z: usize, x: usize, y: usize) -> Self {
        Self { z, x, y }
    }

    /// 读取 3D 数组的形状.
    #[inline]
    pub fn of<S: ndarray::Data>(arr: &ndarray::ArrayBase<S, ndarray::Ix3>) -> Self {
        let (z, x, y) = arr.dim();
        Self { z, x, y }
    }

    /// 以 `(Z, X, Y)` 元组形式返回.
    #[inline]
    pub const fn as_tuple(&self) -> Idx3d {
        (self.z, self.x, self.y)
    }

    /// 体素个数.
    #[inline]
    pub const fn size(&self) -> usize {
        self.z * self.x * self.y
    }
}

/// 4D 体数据. 保存按插入顺序排列的 `(时间点, 3D 体数据)`.
///
/// 时间点标识是不透明的字符串 (例如 DICOM 采集时间), 不保证可排序.
/// 若需要按采集时间排序, 见 [`Volume4D::sort_by_acquisition_time`].
#[derive(Debug, Clone)]
pub struct Volume4D {
    shape: VolumeShape,
    frames: Vec<(String, Array3<f64>)>,
}

impl Volume4D {
    /// 创建形状为 `shape` 的空 4D 体数据.
    #[inline]
    pub fn new(shape: VolumeShape) -> Self {
        Self {
            shape,
            frames: Vec::new(),
        }
    }

    /// 按顺序从 `(时间点, 3D 体数据)` 构造. 第一个时间点决定形状.
    ///
    /// 若 `frames` 为空, 返回 [`VolumeError::Empty`]; 若形状不一致或时间点重复,
    /// 则立刻返回对应错误.
    pub fn from_frames<K, I>(frames: I) -> VolumeResult<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Array3<f64>)>,
    {
        let mut it = frames.into_iter();
        let (key, first) = it.next().ok_or(VolumeError::Empty)?;
        let mut ans = Self::new(VolumeShape::of(&first));
        ans.push(key, first)?;
        for (key, frame) in it {
            ans.push(key, frame)?;
        }
        Ok(ans)
    }

    /// 在末尾追加一个时间点.
    pub fn push(&mut self, key: impl Into<String>, frame: Array3<f64>) -> VolumeResult<()> {
        let key = key.into();
        let found = VolumeShape::of(&frame);
        if found != self.shape {
            return Err(VolumeError::ShapeMismatch {
                time_point: key,
                expected: self.shape.as_tuple(),
                found: found.as_tuple(),
            });
        }
        if self.frames.iter().any(|(k, _)| *k == key) {
            return Err(VolumeError::DuplicateTimePoint(key));
        }
        self.frames.push((key, frame));
        Ok(())
    }

    /// 获取形状描述.
    #[inline]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// 获取时间点个数.
    #[inline]
    pub fn len_t(&self) -> usize {
        self.frames.len()
    }

    /// 是否不含任何时间点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 按插入顺序迭代时间点标识.
    #[inline]
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &str> {
        self.frames.iter().map(|(k, _)| k.as_str())
    }

    /// 获取时间点 `key` 的体数据视图.
    pub fn frame(&self, key: &str) -> Option<ArrayView3<'_, f64>> {
        self.frames
            .iter()
            .find_map(|(k, v)| (k == key).then(|| v.view()))
    }

    /// 获取第 `t` 个 (按插入顺序) 时间点的体数据视图.
    ///
    /// 当 `t` 越界时 panic.
    #[inline]
    pub fn frame_at(&self, t: usize) -> ArrayView3<'_, f64> {
        self.frames[t].1.view()
    }

    /// 按插入顺序迭代 `(时间点, 体数据视图)`.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, ArrayView3<'_, f64>)> {
        self.frames.iter().map(|(k, v)| (k.as_str(), v.view()))
    }
}

/// 分量类型.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ComponentKind {
    /// 低秩分量 L.
    LowRank,

    /// 稀疏分量 S.
    Sparse,
}

/// 从矩阵集合重建的 4D 体数据, 以时间索引 `t` 访问.
///
/// 同时记录重建时缺失的 `(z, x)` 键. 缺失键对应的体素行保持为 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconstructedVolume4D {
    shape: VolumeShape,
    frames: Vec<Array3<f64>>,
    missing: Vec<SliceKey>,
}

impl ReconstructedVolume4D {
    /// 创建 `t_dim` 个全零时间点.
    pub(crate) fn zeros(t_dim: usize, shape: VolumeShape) -> Self {
        Self {
            shape,
            frames: (0..t_dim).map(|_| Array3::zeros(shape.as_tuple())).collect(),
            missing: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn frames_mut(&mut self) -> &mut [Array3<f64>] {
        &mut self.frames
    }

    #[inline]
    pub(crate) fn mark_missing(&mut self, key: SliceKey) {
        self.missing.push(key);
    }

    /// 获取形状描述.
    #[inline]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// 获取时间点个数.
    #[inline]
    pub fn len_t(&self) -> usize {
        self.frames.len()
    }

    /// 获取第 `t` 个时间点的体数据视图.
    ///
    /// 当 `t` 越界时 panic.
    #[inline]
    pub fn at(&self, t: usize) -> ArrayView3<'_, f64> {
        self.frames[t].view()
    }

    /// 按时间顺序迭代体数据视图.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = ArrayView3<'_, f64>> {
        self.frames.iter().map(|f| f.view())
    }

    /// 重建时缺失的键, 按 z 优先序.
    #[inline]
    pub fn missing_keys(&self) -> &[SliceKey] {
        &self.missing
    }

    /// 重建时是否没有任何缺失键.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// 取出所有时间点.
    #[inline]
    pub fn into_frames(self) -> Vec<Array3<f64>> {
        self.frames
    }
}

impl Index<(usize, usize, usize, usize)> for ReconstructedVolume4D {
    type Output = f64;

    /// 按 `(t, z, x, y)` 访问体素.
    #[inline]
    fn index(&self, (t, z, x, y): (usize, usize, usize, usize)) -> &Self::Output {
        &self.frames[t][(z, x, y)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frames_empty() {
        let frames: Vec<(String, Array3<f64>)> = vec![];
        assert!(matches!(
            Volume4D::from_frames(frames),
            Err(VolumeError::Empty)
        ));
    }

    #[test]
    fn test_from_frames_shape_mismatch() {
        let frames = vec![
            ("t0", Array3::zeros((2, 3, 4))),
            ("t1", Array3::zeros((2, 3, 4))),
            ("t2", Array3::zeros((2, 4, 3))),
        ];
        match Volume4D::from_frames(frames) {
            Err(VolumeError::ShapeMismatch {
                time_point,
                expected,
                found,
            }) => {
                assert_eq!(time_point, "t2");
                assert_eq!(expected, (2, 3, 4));
                assert_eq!(found, (2, 4, 3));
            }
            other => panic!("期望形状不一致错误, 但得到 {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_time_point() {
        let mut v = Volume4D::new(VolumeShape::new(1, 1, 1));
        v.push("a", Array3::zeros((1, 1, 1))).unwrap();
        assert!(matches!(
            v.push("a", Array3::ones((1, 1, 1))),
            Err(VolumeError::DuplicateTimePoint(k)) if k == "a"
        ));
        assert_eq!(v.len_t(), 1);
    }

    #[test]
    fn test_insertion_order_kept() {
        let v = Volume4D::from_frames([
            ("20240101T3", Array3::from_elem((1, 1, 2), 3.0)),
            ("20240101T1", Array3::from_elem((1, 1, 2), 1.0)),
            ("20240101T2", Array3::from_elem((1, 1, 2), 2.0)),
        ])
        .unwrap();
        assert_eq!(
            v.keys().collect::<Vec<_>>(),
            ["20240101T3", "20240101T1", "20240101T2"]
        );
        assert_eq!(v.frame_at(1)[(0, 0, 1)], 1.0);
        assert_eq!(v.frame("20240101T2").unwrap()[(0, 0, 0)], 2.0);
        assert!(v.frame("missing").is_none());
        assert_eq!(v.shape(), VolumeShape::new(1, 1, 2));
    }
}
