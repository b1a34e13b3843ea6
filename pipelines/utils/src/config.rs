//! TOML 配置文件.
//!
//! 所有字段均可省略, 省略时取库的默认值. 未知字段会被拒绝.
//!
//! ```toml
//! lambda = 0.25
//! max_iters = 5
//! tolerance = 1e-7
//! z_range = [10, 20]
//! workers = 8
//! input = "/data/gated/patient01"
//! output = "/data/gated/patient01_lsd"
//! sort_by_acquisition_time = true
//! components = 3
//! ```

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use gate_berry::consts::{DEFAULT_LAMBDA, DEFAULT_TOLERANCE, DEFAULT_VOLUME_MAX_ITERS};
use serde::Deserialize;

/// 配置读取错误.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 无法读取配置文件.
    #[error("无法读取配置文件 `{}`: {source}", path.display())]
    Read {
        /// 配置文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// TOML 语法或字段错误.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    /// 字段取值不合法.
    #[error("配置项 `{field}` 不合法: {reason}")]
    Invalid {
        /// 字段名.
        field: &'static str,
        /// 原因.
        reason: String,
    },
}

/// 流水线配置.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    /// 稀疏项权重 λ.
    pub lambda: f64,

    /// 每个切片的求解迭代上限.
    pub max_iters: usize,

    /// 收敛阈值 (原始残差与对偶残差).
    pub tolerance: f64,

    /// 处理的 z 范围 `[start, end)`. 省略时处理全部 z.
    pub z_range: Option<(usize, usize)>,

    /// 工作线程数, 0 表示使用 [`gate_berry::decompose::available_workers`].
    pub workers: usize,

    /// 输入目录 (逐时间点 nii 文件).
    pub input: Option<PathBuf>,

    /// 输出根目录.
    pub output: Option<PathBuf>,

    /// 是否将时间点标识视为采集时间并排序.
    pub sort_by_acquisition_time: bool,

    /// 时间主成分个数, 省略时计算全部.
    pub components: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lambda: DEFAULT_LAMBDA,
            max_iters: DEFAULT_VOLUME_MAX_ITERS,
            tolerance: DEFAULT_TOLERANCE,
            z_range: None,
            workers: 0,
            input: None,
            output: None,
            sort_by_acquisition_time: false,
            components: None,
        }
    }
}

impl PipelineConfig {
    /// 检查各字段取值.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_owned(),
            })
        };
        if !(self.lambda.is_finite() && self.lambda > 0.0) {
            return invalid("lambda", "必须为正有限数");
        }
        if self.max_iters == 0 {
            return invalid("max_iters", "必须为正");
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return invalid("tolerance", "必须为正有限数");
        }
        if let Some((start, end)) = self.z_range {
            if start >= end {
                return invalid("z_range", "起点必须小于终点");
            }
        }
        Ok(())
    }

    /// 以 [`Range`] 形式返回 z 范围.
    #[inline]
    pub fn z_range(&self) -> Option<Range<usize>> {
        self.z_range.map(|(start, end)| start..end)
    }
}

impl FromStr for PipelineConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// 读取并检查配置文件.
pub fn read_config_file<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_owned(),
        source,
    })?;
    text.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_is_default() {
        let config: PipelineConfig = "".parse().unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.lambda, 0.25);
        assert_eq!(config.max_iters, 5);
    }

    #[test]
    fn test_full_config() {
        let input = r#"
            lambda = 0.5
            max_iters = 40
            tolerance = 1e-6
            z_range = [3, 9]
            workers = 4
            input = "/tmp/in"
            output = "/tmp/out"
            sort_by_acquisition_time = true
            components = 2
        "#;
        let config: PipelineConfig = input.parse().unwrap();
        assert_eq!(
            config,
            PipelineConfig {
                lambda: 0.5,
                max_iters: 40,
                tolerance: 1e-6,
                z_range: Some((3, 9)),
                workers: 4,
                input: Some("/tmp/in".into()),
                output: Some("/tmp/out".into()),
                sort_by_acquisition_time: true,
                components: Some(2),
            }
        );
        assert_eq!(config.z_range(), Some(3..9));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            "lamda = 0.3".parse::<PipelineConfig>(),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        for (text, field) in [
            ("lambda = -1.0", "lambda"),
            ("max_iters = 0", "max_iters"),
            ("tolerance = 0.0", "tolerance"),
            ("z_range = [4, 4]", "z_range"),
        ] {
            match text.parse::<PipelineConfig>() {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("`{text}` 应当不合法, 但得到 {other:?}"),
            }
        }
    }

    #[test]
    fn test_read_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lsd.toml");
        fs::write(&path, "lambda = 0.3\nworkers = 2\n").unwrap();
        let config = read_config_file(&path).unwrap();
        assert_eq!(config.lambda, 0.3);
        assert_eq!(config.workers, 2);

        assert!(matches!(
            read_config_file(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
