//! 流水线程序依赖的通用组件.

use std::env;
use std::path::PathBuf;

pub mod config;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获取 `$HOME/dataset` 下的子路径. 无法确定主目录时返回 `None`.
pub fn home_dataset_dir_with<I>(it: I) -> Option<PathBuf>
where
    I: IntoIterator,
    I::Item: AsRef<std::path::Path>,
{
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    for p in it {
        ans.push(p);
    }
    Some(ans)
}

/// 获取门控数据根目录.
///
/// 1. 若环境变量 `$GATE_DATA_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/gated`;
/// 3. 连主目录都无法确定时, 返回当前目录下的 `dataset/gated`.
pub fn data_dir_from_env_or_home() -> PathBuf {
    match env::var("GATE_DATA_DIR") {
        Ok(d) if !d.is_empty() => PathBuf::from(d),
        _ => home_dataset_dir_with(["gated"])
            .unwrap_or_else(|| PathBuf::from("dataset").join("gated")),
    }
}

/// 门控数据根目录下的子目录.
#[inline]
pub fn data_subdir(name: &str) -> PathBuf {
    data_dir_from_env_or_home().join(name)
}
