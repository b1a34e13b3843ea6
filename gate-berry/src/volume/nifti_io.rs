//! nii 文件读写.
//!
//! nifti 按 `[W, H, z]` 存储体素; 库内统一使用 `(Z, X, Y)`, 即 `(z, H, W)`.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayView3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::{ComponentKind, ReconstructedVolume4D, Volume4D, VolumeError, VolumeResult};
use crate::consts::filename;

/// 去掉 nii 扩展名后的文件名. 不是 nii 文件时返回 `None`.
fn nifti_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
}

/// 读取单个 3D nii 文件, 返回 `(Z, X, Y)` 布局的数组.
///
/// 第 3 维之后的单例维度 (例如单时间点 4D 文件) 会被去除.
pub(crate) fn read_nifti_3d(path: &Path) -> VolumeResult<Array3<f64>> {
    let obj = ReaderOptions::new().read_file(path)?;
    let mut data = obj.into_volume().into_ndarray::<f64>()?;

    while data.ndim() > 3 && data.shape()[data.ndim() - 1] == 1 {
        let last = data.ndim() - 1;
        data = data.index_axis_move(Axis(last), 0);
    }
    let ndim = data.ndim();
    let data = data
        .into_dimensionality::<Ix3>()
        .map_err(|_| VolumeError::NotThreeDimensional {
            path: path.to_owned(),
            ndim,
        })?;

    // [W, H, z] -> [z, H, W].
    Ok(data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned())
}

/// 单位仿射变换 (不缩放, 不旋转) 的 header.
fn identity_header() -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.pixdim = [1.0; 8];
    header.qform_code = 0;
    header.sform_code = 1;
    header.srow_x = [1.0, 0.0, 0.0, 0.0];
    header.srow_y = [0.0, 1.0, 0.0, 0.0];
    header.srow_z = [0.0, 0.0, 1.0, 0.0];
    header
}

/// 将 `(Z, X, Y)` 布局的数组写成 nii 文件. 重新读取会得到相同的数组.
pub(crate) fn write_nifti_3d(path: &Path, data: ArrayView3<'_, f64>) -> VolumeResult<()> {
    let header = identity_header();
    // [z, H, W] -> [W, H, z].
    let data = data.permuted_axes([2, 1, 0]).as_standard_layout().into_owned();
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&data)?;
    Ok(())
}

impl Volume4D {
    /// 从目录加载逐时间点的 nii 文件 (`*.nii`, `*.nii.gz`).
    ///
    /// 文件按文件名排序后依次作为时间点加入, 时间点标识为去掉扩展名的文件名.
    /// 目录中没有 nii 文件时返回 [`VolumeError::Empty`].
    pub fn open_nifti_dir<P: AsRef<Path>>(dir: P) -> VolumeResult<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir.as_ref())?
            .map(|e| e.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        paths.retain(|p| p.is_file() && nifti_stem(p).is_some());
        paths.sort();

        log::info!(
            "从 `{}` 读取 {} 个时间点",
            dir.as_ref().display(),
            paths.len()
        );

        let frames = paths
            .iter()
            .map(|p| {
                let key = nifti_stem(p).unwrap_or_default().to_owned();
                read_nifti_3d(p).map(|v| (key, v))
            })
            .collect::<VolumeResult<Vec<_>>>()?;
        Self::from_frames(frames)
    }
}

impl ReconstructedVolume4D {
    /// 将每个时间点写成 `dir` 下的一个 nii 文件, 返回写出的路径.
    ///
    /// 文件名由 `kind` 和时间索引决定 (`C{t}_3D_L.nii.gz` / `C{t}_3D_S.nii.gz`),
    /// 已存在的文件会被覆盖. `dir` 不存在时会被创建.
    pub fn save_nifti<P: AsRef<Path>>(
        &self,
        dir: P,
        kind: ComponentKind,
    ) -> VolumeResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.len_t());
        for (t, frame) in self.iter().enumerate() {
            let name = match kind {
                ComponentKind::LowRank => filename::low_rank_nifti(t),
                ComponentKind::Sparse => filename::sparse_nifti(t),
            };
            let path = dir.join(name);
            write_nifti_3d(&path, frame)?;
            log::debug!("写出 `{}`", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
