use ndarray::{s, Axis};

use super::PersistError;
use crate::slice::key_space;
use crate::{MatrixCollection, ReconstructedVolume4D, VolumeShape};

/// 将矩阵集合拼装为 `t_dim` 个形状为 `shape` 的 3D 体数据.
///
/// 对每个 `t`, 每个平面 `z` 和行 `x`, 体素行 `(z, x, ..)` 取自 `collection[(z, x)]` 的第 `t` 列.
///
/// 集合中缺少的键会被记录到 [`ReconstructedVolume4D::missing_keys`] 并输出一条警告,
/// 对应体素保持为 0. 超出 `shape` 的键被忽略.
///
/// # 错误
///
/// 存在的矩阵形状不是 `(Y, t_dim)` 时返回 [`PersistError::SliceShape`].
pub fn to_volume4d(
    collection: &MatrixCollection,
    t_dim: usize,
    shape: VolumeShape,
) -> Result<ReconstructedVolume4D, PersistError> {
    let mut ans = ReconstructedVolume4D::zeros(t_dim, shape);
    let expected = (shape.y, t_dim);

    for key in key_space(0..shape.z, shape.x) {
        let Some(matrix) = collection.get(&key) else {
            log::warn!("缺少切片 {key}, 对应体素保持为 0");
            ans.mark_missing(key);
            continue;
        };
        if matrix.dim() != expected {
            return Err(PersistError::SliceShape {
                key,
                expected,
                found: matrix.dim(),
            });
        }
        for (frame, column) in ans.frames_mut().iter_mut().zip(matrix.axis_iter(Axis(1))) {
            frame.slice_mut(s![key.z, key.x, ..]).assign(&column);
        }
    }

    if !ans.is_complete() {
        log::warn!("重建时共缺少 {} 个切片", ans.missing_keys().len());
    }
    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reshape::reshape;
    use crate::{SliceKey, Volume4D};
    use ndarray::{array, Array3};

    fn sample_volume() -> Volume4D {
        let shape = VolumeShape::new(2, 3, 4);
        Volume4D::from_frames((0..5).map(|t| {
            let frame = Array3::from_shape_fn(shape.as_tuple(), |(z, x, y)| {
                ((t + 1) * (z * 12 + x * 4 + y + 1)) as f64 * 0.5
            });
            (format!("t{t}"), frame)
        }))
        .unwrap()
    }

    #[test]
    fn test_round_trip() {
        let vol = sample_volume();
        let c = reshape(&vol, None).unwrap();
        let back = to_volume4d(&c, vol.len_t(), vol.shape()).unwrap();
        assert!(back.is_complete());
        assert_eq!(back.len_t(), 5);
        for (t, (_, frame)) in vol.iter().enumerate() {
            assert_eq!(back.at(t), frame);
        }
    }

    #[test]
    fn test_missing_key_defaults_to_zero() {
        let vol = sample_volume();
        let mut c = reshape(&vol, None).unwrap();
        let gone = SliceKey::new(1, 2);
        c.remove(&gone);

        let back = to_volume4d(&c, vol.len_t(), vol.shape()).unwrap();
        assert_eq!(back.missing_keys(), [gone]);
        for t in 0..vol.len_t() {
            for y in 0..4 {
                assert_eq!(back[(t, 1, 2, y)], 0.0);
            }
            assert_eq!(back[(t, 1, 1, 0)], vol.frame_at(t)[(1, 1, 0)]);
        }
    }

    #[test]
    fn test_partial_z_range_marks_rest_missing() {
        let vol = sample_volume();
        let c = reshape(&vol, Some(1..2)).unwrap();
        let back = to_volume4d(&c, vol.len_t(), vol.shape()).unwrap();
        let missing: Vec<_> = back.missing_keys().iter().map(|k| (k.z, k.x)).collect();
        assert_eq!(missing, [(0, 0), (0, 1), (0, 2)]);
    }

    #[test]
    fn test_shape_mismatch() {
        let mut c = MatrixCollection::new();
        c.insert(SliceKey::new(0, 0), array![[1.0, 2.0]]);
        match to_volume4d(&c, 3, VolumeShape::new(1, 1, 1)) {
            Err(PersistError::SliceShape {
                key,
                expected,
                found,
            }) => {
                assert_eq!(key, SliceKey::new(0, 0));
                assert_eq!(expected, (1, 3));
                assert_eq!(found, (1, 2));
            }
            other => panic!("期望形状错误, 但得到 {other:?}"),
        }
    }
}
