use std::fs;
use std::ops::Range;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use ndarray::Array2;

use super::PersistError;
use crate::consts::filename;
use crate::slice::key_space;
use crate::{MatrixCollection, SliceKey, SliceMatrix};

fn csv_err(path: &Path) -> impl FnOnce(csv::Error) -> PersistError + '_ {
    move |source| PersistError::Csv {
        path: path.to_owned(),
        source,
    }
}

fn write_slice(path: &Path, matrix: &SliceMatrix) -> Result<(), PersistError> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err(path))?;
    for row in matrix.rows() {
        wtr.serialize(row.to_vec()).map_err(csv_err(path))?;
    }
    wtr.flush()?;
    Ok(())
}

fn read_slice(path: &Path) -> Result<SliceMatrix, PersistError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(csv_err(path))?;
    let rows = rdr
        .deserialize::<Vec<f64>>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err(path))?;

    // 非 flexible 模式下各行长度必然一致.
    let cols = rows.first().map_or(0, Vec::len);
    Ok(Array2::from_shape_fn((rows.len(), cols), |(i, j)| rows[i][j]))
}

/// 将 `collection` 中的每个矩阵写入 `dir` 下的 `slice_z{z}_x{x}.csv`.
///
/// `dir` 不存在时会被创建; 同名文件会被覆盖. 浮点数以最短的可精确回读形式写出,
/// 因此再次导入会得到完全相同的矩阵.
pub fn export<P: AsRef<Path>>(collection: &MatrixCollection, dir: P) -> Result<(), PersistError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    for (key, matrix) in collection {
        let path = dir.join(filename::slice_csv(*key));
        write_slice(&path, matrix)?;
        log::debug!("写出 `{}`", path.display());
    }
    log::info!("向 `{}` 导出 {} 个切片", dir.display(), collection.len());
    Ok(())
}

/// 从 `dir` 读取键空间 `z_range × [0, x_dim)` 内的全部切片.
///
/// 键空间由参数显式给出, 与导出时使用的范围一致即可.
///
/// # 错误
///
/// 1. 任一切片文件不存在时立刻返回 [`PersistError::MissingSlice`].
/// 2. 文件中各行长度不一致或含有非数值时返回 [`PersistError::Csv`].
pub fn import<P: AsRef<Path>>(
    dir: P,
    z_range: Range<usize>,
    x_dim: usize,
) -> Result<MatrixCollection, PersistError> {
    let dir = dir.as_ref();
    let collection = key_space(z_range, x_dim)
        .map(|key: SliceKey| {
            let path = dir.join(filename::slice_csv(key));
            if !path.is_file() {
                return Err(PersistError::MissingSlice { key, path });
            }
            Ok((key, read_slice(&path)?))
        })
        .collect::<Result<MatrixCollection, _>>()?;
    log::info!("从 `{}` 导入 {} 个切片", dir.display(), collection.len());
    Ok(collection)
}
