//! 数据集操作.
//!
//! 受试者元数据, 训练配置, 以及实验输出目录的约定.

use std::path::{Path, PathBuf};

mod configuration;
mod layout;
mod subject;

pub use configuration::{split_id, PredictionRecord, TrainerConfiguration};
pub use layout::ExperimentLayout;
pub use subject::{Subject, SubjectManifest};

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = home_dataset_dir()?;
    ans.extend(it);
    Some(ans)
}
