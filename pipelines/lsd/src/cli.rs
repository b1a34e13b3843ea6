//! 命令行参数.

use std::path::PathBuf;

use gate_berry::VolumeShape;
use utils::config::PipelineConfig;

/// 解析 `Z,X,Y` 形式的体数据形状.
fn parse_shape(s: &str) -> Result<VolumeShape, String> {
    let parts: Vec<usize> = s
        .split(',')
        .map(|p| p.trim().parse::<usize>().map_err(|e| format!("`{p}`: {e}")))
        .collect::<Result<_, _>>()?;
    match parts[..] {
        [z, x, y] if z > 0 && x > 0 && y > 0 => Ok(VolumeShape::new(z, x, y)),
        [_, _, _] => Err("各维度必须为正".to_owned()),
        _ => Err(format!("期望 `Z,X,Y`, 但得到 `{s}`")),
    }
}

/// Low-rank + sparse decomposition of respiratory-gated 4D volumes
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "lsd", version)]
pub(super) struct Cli {
    /// TOML configuration file; command line flags take precedence
    #[clap(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log per-slice solver diagnostics
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

/// Parameters shared by every command that touches `z`.
#[derive(clap::Args, Debug, Clone)]
pub(super) struct ZRange {
    /// First z plane to process
    #[clap(long)]
    pub z_start: Option<usize>,

    /// One past the last z plane to process
    #[clap(long)]
    pub z_end: Option<usize>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub(super) enum Command {
    /// Decompose a directory of per-time-point NIFTI files and write L and S volumes
    Decompose {
        /// Directory with one `.nii` / `.nii.gz` file per time point
        #[clap(short, long)]
        input: Option<PathBuf>,

        /// Output directory (CSV slices and NIFTI volumes)
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Weight of the sparse term
        #[clap(short, long)]
        lambda: Option<f64>,

        /// Solver iteration budget per slice
        #[clap(short, long)]
        max_iters: Option<usize>,

        /// Relative primal and dual residual at which a slice counts as converged
        #[clap(short, long)]
        tolerance: Option<f64>,

        /// Number of worker threads (0 = all cores)
        #[clap(short = 'j', long)]
        workers: Option<usize>,

        /// Treat file names as DICOM acquisition times and sort by them
        #[clap(long)]
        sort_by_time: bool,

        #[clap(flatten)]
        z: ZRange,
    },

    /// Rebuild NIFTI volumes from previously exported CSV slices
    Reassemble {
        /// Directory with the low-rank CSV slices
        #[clap(long)]
        low_rank: PathBuf,

        /// Directory with the sparse CSV slices
        #[clap(long)]
        sparse: PathBuf,

        /// Volume shape as `Z,X,Y`
        #[clap(long, value_parser = parse_shape)]
        shape: VolumeShape,

        /// Number of time points
        #[clap(short = 'T', long)]
        t_dim: usize,

        /// Output directory for NIFTI volumes
        #[clap(short, long)]
        output: PathBuf,

        #[clap(flatten)]
        z: ZRange,
    },

    /// Global temporal principal components of a NIFTI directory
    Components {
        /// Directory with one `.nii` / `.nii.gz` file per time point
        #[clap(short, long)]
        input: Option<PathBuf>,

        /// Output directory
        #[clap(short, long)]
        output: Option<PathBuf>,

        /// Number of components to keep
        #[clap(short, long)]
        n: Option<usize>,
    },
}

impl ZRange {
    /// 与配置合并. `--z-end` 缺省时取体数据的全部剩余平面, 由 `len_z` 决定.
    pub fn resolve(&self, config: &PipelineConfig, len_z: usize) -> Option<std::ops::Range<usize>> {
        match (self.z_start, self.z_end) {
            (None, None) => config.z_range(),
            (start, end) => Some(start.unwrap_or(0)..end.unwrap_or(len_z)),
        }
    }
}
