//! 程序运行函数.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Instant;

use gate_berry::components::principal_components;
use gate_berry::decompose::VolumeDecomposer;
use gate_berry::persist::{export, import, to_volume4d};
use gate_berry::solver::LsSolver;
use gate_berry::{ComponentKind, ReconstructedVolume4D, Volume4D, VolumeShape};
use utils::config::PipelineConfig;

use crate::cli::{Command, ZRange};
use crate::report::{ComponentsReport, RunReport};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

const LOW_RANK_CSV: &str = "L_csv";
const SPARSE_CSV: &str = "S_csv";
const NIFTI: &str = "nifti";

fn input_dir(cli: Option<PathBuf>, config: &PipelineConfig) -> PathBuf {
    cli.or_else(|| config.input.clone())
        .unwrap_or_else(|| utils::data_subdir("raw"))
}

fn output_dir(cli: Option<PathBuf>, config: &PipelineConfig, default: &str) -> PathBuf {
    cli.or_else(|| config.output.clone())
        .unwrap_or_else(|| utils::data_subdir(default))
}

fn load_volume(dir: &Path, sort_by_time: bool) -> Result<Volume4D> {
    if !dir.is_dir() {
        return Err(format!("输入目录 `{}` 不存在", dir.display()).into());
    }
    let mut volume = Volume4D::open_nifti_dir(dir)?;
    if sort_by_time {
        volume.sort_by_acquisition_time();
        if let Some(offsets) = volume.acquisition_offsets() {
            log::info!("采集时间偏移 (ms): {offsets:?}");
        }
    }
    Ok(volume)
}

/// 写出 `L`, `S` 两组 NIFTI 文件, 返回写出的文件个数.
fn save_pair(
    low_rank: &ReconstructedVolume4D,
    sparse: &ReconstructedVolume4D,
    dir: &Path,
) -> Result<usize> {
    let l = low_rank.save_nifti(dir, ComponentKind::LowRank)?;
    let s = sparse.save_nifti(dir, ComponentKind::Sparse)?;
    Ok(l.len() + s.len())
}

/// 分解 -> 导出 CSV -> 导入 -> 重建 -> 写 NIFTI.
fn decompose(config: &PipelineConfig, input: PathBuf, output: PathBuf, z: &ZRange) -> Result<RunReport> {
    let start = Instant::now();
    let volume = load_volume(&input, config.sort_by_acquisition_time)?;
    let shape = volume.shape();
    let t_dim = volume.len_t();
    let z_range = z.resolve(config, shape.z);
    log::info!(
        "体数据形状 {:?}, {t_dim} 个时间点, z 范围 {:?}",
        shape.as_tuple(),
        z_range.clone().unwrap_or(0..shape.z)
    );

    let solver = LsSolver::new(config.lambda, config.max_iters)?.with_tolerance(config.tolerance);
    let decomposer = VolumeDecomposer::new(solver).with_workers(config.workers);
    let (low_rank, sparse) = decomposer.decompose_volume(&volume, z_range.clone())?;
    let slices = low_rank.len();

    let (l_dir, s_dir) = (output.join(LOW_RANK_CSV), output.join(SPARSE_CSV));
    export(&low_rank, &l_dir)?;
    export(&sparse, &s_dir)?;
    drop((low_rank, sparse));

    let z_range = z_range.unwrap_or(0..shape.z);
    let low_rank = to_volume4d(&import(&l_dir, z_range.clone(), shape.x)?, t_dim, shape)?;
    let sparse = to_volume4d(&import(&s_dir, z_range, shape.x)?, t_dim, shape)?;
    let files = save_pair(&low_rank, &sparse, &output.join(NIFTI))?;

    Ok(RunReport {
        input,
        output,
        shape,
        t_dim,
        slices,
        missing: low_rank.missing_keys().len(),
        nifti_files: files,
        elapsed: start.elapsed(),
    })
}

/// 导入 CSV -> 重建 -> 写 NIFTI.
fn reassemble(
    config: &PipelineConfig,
    (low_rank, sparse): (&Path, &Path),
    shape: VolumeShape,
    t_dim: usize,
    output: PathBuf,
    z: &ZRange,
) -> Result<RunReport> {
    let start = Instant::now();
    let z_range = z.resolve(config, shape.z).unwrap_or(0..shape.z);
    if z_range.is_empty() || z_range.end > shape.z {
        return Err(format!("z 范围 {z_range:?} 为空或超出 [0, {})", shape.z).into());
    }
    let l = import(low_rank, z_range.clone(), shape.x)?;
    let s = import(sparse, z_range, shape.x)?;
    let slices = l.len();
    let l = to_volume4d(&l, t_dim, shape)?;
    let s = to_volume4d(&s, t_dim, shape)?;
    let files = save_pair(&l, &s, &output)?;

    Ok(RunReport {
        input: low_rank.parent().unwrap_or(low_rank).to_owned(),
        output,
        shape,
        t_dim,
        slices,
        missing: l.missing_keys().len(),
        nifti_files: files,
        elapsed: start.elapsed(),
    })
}

fn components(
    config: &PipelineConfig,
    input: PathBuf,
    output: PathBuf,
    n: Option<usize>,
) -> Result<ComponentsReport> {
    let volume = load_volume(&input, config.sort_by_acquisition_time)?;
    let pc = principal_components(&volume, n.or(config.components))?;
    let written = pc.save(&output)?;
    Ok(ComponentsReport {
        output,
        singular_values: pc.singular_values().to_vec(),
        files: written.len(),
    })
}

/// 按子命令实际运行, 并打印运行结果.
pub(super) fn run(config: &PipelineConfig, command: Command) -> Result<()> {
    match command {
        Command::Decompose {
            input,
            output,
            lambda,
            max_iters,
            tolerance,
            workers,
            sort_by_time,
            z,
        } => {
            let mut config = config.clone();
            config.lambda = lambda.unwrap_or(config.lambda);
            config.max_iters = max_iters.unwrap_or(config.max_iters);
            config.tolerance = tolerance.unwrap_or(config.tolerance);
            config.workers = workers.unwrap_or(config.workers);
            config.sort_by_acquisition_time |= sort_by_time;
            config.validate()?;

            let input = input_dir(input, &config);
            let output = output_dir(output, &config, "lsd");
            decompose(&config, input, output, &z)?.analyze();
        }
        Command::Reassemble {
            low_rank,
            sparse,
            shape,
            t_dim,
            output,
            z,
        } => {
            reassemble(config, (low_rank.as_path(), sparse.as_path()), shape, t_dim, output, &z)?.analyze();
        }
        Command::Components { input, output, n } => {
            let input = input_dir(input, config);
            let output = output_dir(output, config, "components");
            components(config, input, output, n)?.analyze();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_berry::SliceKey;
    use ndarray::Array3;

    fn write_input(dir: &Path) -> Volume4D {
        let shape = VolumeShape::new(2, 2, 3);
        let volume = Volume4D::from_frames((0..3).map(|t| {
            let frame = Array3::from_shape_fn(shape.as_tuple(), |(z, x, y)| {
                5.0 + (z + x) as f64 + if (t, y) == (1, 2) { 4.0 } else { 0.0 }
            });
            (format!("t{t}"), frame)
        }))
        .unwrap();

        // 借助重建体数据的 nii 写出功能生成输入文件.
        let collection = gate_berry::reshape::reshape(&volume, None).unwrap();
        let rebuilt = to_volume4d(&collection, 3, shape).unwrap();
        rebuilt.save_nifti(dir, ComponentKind::LowRank).unwrap();
        volume
    }

    #[test]
    fn test_decompose_then_reassemble() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        let volume = write_input(&input);
        let output = root.path().join("out");
        let config = PipelineConfig {
            max_iters: 200,
            workers: 0,
            ..Default::default()
        };
        let z = ZRange {
            z_start: None,
            z_end: None,
        };

        let report = decompose(&config, input, output.clone(), &z).unwrap();
        assert_eq!(report.slices, 4);
        assert_eq!(report.missing, 0);
        assert_eq!(report.nifti_files, 6);
        assert!(output.join("L_csv").join("slice_z1_x1.csv").is_file());
        assert!(output.join(NIFTI).join("C2_3D_S.nii.gz").is_file());

        // L + S 复原输入.
        let nifti = Volume4D::open_nifti_dir(output.join(NIFTI)).unwrap();
        for t in 0..3 {
            let l = nifti.frame(&format!("C{t}_3D_L")).unwrap();
            let s = nifti.frame(&format!("C{t}_3D_S")).unwrap();
            let m = volume.frame_at(t);
            for ((a, b), c) in l.iter().zip(s.iter()).zip(m.iter()) {
                assert!((a + b - c).abs() < 1e-3);
            }
        }

        let again = root.path().join("again");
        let report = reassemble(
            &config,
            (output.join("L_csv").as_path(), output.join("S_csv").as_path()),
            volume.shape(),
            3,
            again.clone(),
            &z,
        )
        .unwrap();
        assert_eq!(report.slices, 4);
        assert!(again.join("C0_3D_L.nii.gz").is_file());
    }

    #[test]
    fn test_reassemble_missing_slice_fails() {
        let root = tempfile::tempdir().unwrap();
        let empty = root.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let z = ZRange {
            z_start: None,
            z_end: None,
        };
        let err = reassemble(
            &PipelineConfig::default(),
            (empty.as_path(), empty.as_path()),
            VolumeShape::new(1, 1, 1),
            1,
            root.path().join("out"),
            &z,
        )
        .unwrap_err();
        let err = err
            .downcast::<gate_berry::persist::PersistError>()
            .unwrap();
        assert!(matches!(
            *err,
            gate_berry::persist::PersistError::MissingSlice { key, .. } if key == SliceKey::new(0, 0)
        ));
    }

    #[test]
    fn test_components() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("in");
        write_input(&input);
        let report = components(&PipelineConfig::default(), input, root.path().join("pc"), Some(2))
            .unwrap();
        assert!(!report.singular_values.is_empty());
        assert!(report.singular_values.len() <= 2);
        assert!(root.path().join("pc").join("singular_values.npy").is_file());
    }
}
