//! 全局时间主成分.
//!
//! 将每个时间点展平为一行得到 `(T, Z·X·Y)` 矩阵, 求其 thin SVD.
//! 时间点个数远小于体素个数, 因此通过 `T × T` 的 Gram 矩阵做对称特征分解,
//! 再由特征向量换算出空间主成分.

use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Array3, ArrayView3};

use crate::consts::filename;
use crate::volume::write_nifti_3d;
use crate::{Volume4D, VolumeError, VolumeResult, VolumeShape};

/// Gram 矩阵特征值的相对截断阈值. 经过平方后, 零奇异值的数值误差约为 `√ε · σ_max`.
const EIGEN_CUTOFF: f64 = 1e-10;

/// 时间主成分分析结果, 按奇异值降序排列.
#[derive(Debug, Clone)]
pub struct Components {
    shape: VolumeShape,
    singular_values: Array1<f64>,
    temporal: Array2<f64>,
    volumes: Vec<Array3<f64>>,
}

impl Components {
    /// 主成分个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    /// 是否不含任何主成分.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// 每个主成分体数据的形状.
    #[inline]
    pub fn shape(&self) -> VolumeShape {
        self.shape
    }

    /// 奇异值 (降序).
    #[inline]
    pub fn singular_values(&self) -> &Array1<f64> {
        &self.singular_values
    }

    /// 时间方向的单位向量, 形状 `(T, k)`, 第 `i` 列对应第 `i` 个主成分.
    #[inline]
    pub fn temporal(&self) -> &Array2<f64> {
        &self.temporal
    }

    /// 第 `i` 个空间主成分 (单位范数).
    ///
    /// 当 `i` 越界时 panic.
    #[inline]
    pub fn volume(&self, i: usize) -> ArrayView3<'_, f64> {
        self.volumes[i].view()
    }

    /// 将每个空间主成分写为 `dir/C{i}_3D.nii.gz`, 奇异值写为 `dir/singular_values.npy`.
    ///
    /// 返回写出的所有文件路径, 奇异值文件在最后.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> VolumeResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.len() + 1);
        for (i, v) in self.volumes.iter().enumerate() {
            let path = dir.join(filename::component_nifti(i));
            write_nifti_3d(&path, v.view())?;
            written.push(path);
        }
        let path = dir.join(filename::SINGULAR_VALUES);
        ndarray_npy::write_npy(&path, &self.singular_values)?;
        written.push(path);
        log::info!("向 `{}` 写出 {} 个主成分", dir.display(), self.len());
        Ok(written)
    }
}

/// 计算 `volume` 的前 `n` 个 (缺省为全部) 时间主成分.
///
/// 行的顺序即时间点的插入顺序. 奇异值为零 (数值意义下) 的主成分被丢弃,
/// 因此结果个数可能少于 `n`. 每个主成分的符号取为使其绝对值最大的体素为正.
///
/// # 错误
///
/// 1. `volume` 为空时返回 [`VolumeError::Empty`].
/// 2. 特征分解不收敛时返回 [`VolumeError::Eigen`].
pub fn principal_components(volume: &Volume4D, n: Option<usize>) -> VolumeResult<Components> {
    if volume.is_empty() {
        return Err(VolumeError::Empty);
    }
    let shape = volume.shape();
    let t_dim = volume.len_t();

    let mut rows = Array2::<f64>::zeros((t_dim, shape.size()));
    for (mut row, (_, frame)) in rows.rows_mut().into_iter().zip(volume.iter()) {
        row.iter_mut().zip(frame.iter()).for_each(|(a, &b)| *a = b);
    }

    let gram = rows.dot(&rows.t());
    let gram = DMatrix::from_fn(t_dim, t_dim, |i, j| gram[(i, j)]);
    let eigen = SymmetricEigen::try_new(gram, f64::EPSILON, 0).ok_or(VolumeError::Eigen)?;

    let mut order: Vec<usize> = (0..t_dim).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let largest = eigen.eigenvalues[order[0]].max(0.0);
    let cutoff = largest * EIGEN_CUTOFF;
    let wanted = n.unwrap_or(t_dim).min(t_dim);
    let kept: Vec<usize> = order
        .into_iter()
        .take(wanted)
        .filter(|&i| eigen.eigenvalues[i] > cutoff)
        .collect();
    log::debug!("保留 {} / {t_dim} 个时间主成分", kept.len());

    let mut singular_values = Array1::zeros(kept.len());
    let mut temporal = Array2::zeros((t_dim, kept.len()));
    let mut volumes = Vec::with_capacity(kept.len());
    for (c, &i) in kept.iter().enumerate() {
        let sigma = eigen.eigenvalues[i].sqrt();
        let v = Array1::from_shape_fn(t_dim, |t| eigen.eigenvectors[(t, i)]);
        let mut u = rows.t().dot(&v) / sigma;

        let pivot = u.iter().fold(0.0_f64, |m, &x| if x.abs() > m.abs() { x } else { m });
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        u *= sign;

        singular_values[c] = sigma;
        temporal.column_mut(c).assign(&(v * sign));
        volumes.push(Array3::from_shape_fn(shape.as_tuple(), |(z, x, y)| {
            u[(z * shape.x + x) * shape.y + y]
        }));
    }

    Ok(Components {
        shape,
        singular_values,
        temporal,
        volumes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;

    fn rank_one() -> (Volume4D, Array3<f64>, [f64; 4]) {
        let base = Array3::from_shape_fn((2, 2, 3), |(z, x, y)| 1.0 + (z * 6 + x * 3 + y) as f64);
        let amps = [1.0, 2.0, -0.5, 3.0];
        let vol = Volume4D::from_frames(
            amps.iter()
                .enumerate()
                .map(|(t, &a)| (format!("t{t}"), &base * a)),
        )
        .unwrap();
        (vol, base, amps)
    }

    #[test]
    fn test_rank_one_volume() {
        let (vol, base, amps) = rank_one();
        let pc = principal_components(&vol, None).unwrap();
        assert_eq!(pc.len(), 1);
        assert_eq!(pc.shape(), vol.shape());

        let base_norm = base.iter().map(|v| v * v).sum::<f64>().sqrt();
        let amp_norm = amps.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert_float_eq!(pc.singular_values()[0], base_norm * amp_norm, rmax <= 1e-9);

        for (a, b) in pc.volume(0).iter().zip(base.iter()) {
            assert_float_eq!(*a, b / base_norm, abs <= 1e-9);
        }
        for (t, a) in amps.iter().enumerate() {
            assert_float_eq!(pc.temporal()[(t, 0)], a / amp_norm, abs <= 1e-9);
        }
    }

    #[test]
    fn test_limit_and_empty() {
        let (vol, _, _) = rank_one();
        assert_eq!(principal_components(&vol, Some(0)).unwrap().len(), 0);
        let empty = Volume4D::new(VolumeShape::new(1, 1, 1));
        assert!(matches!(
            principal_components(&empty, None),
            Err(VolumeError::Empty)
        ));
    }

    #[test]
    fn test_save() {
        let (vol, _, _) = rank_one();
        let pc = principal_components(&vol, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let written = pc.save(dir.path()).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("C0_3D.nii.gz").is_file());

        let sv: Array1<f64> = ndarray_npy::read_npy(dir.path().join("singular_values.npy")).unwrap();
        assert_eq!(&sv, pc.singular_values());
    }
}
