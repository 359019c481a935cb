//! 对 `ctr-berry::dataset` 的更一层封装. 从环境变量读取实验参数.
//!
//! | 环境变量 | 默认值 |
//! |---|---|
//! | `CTR_WORK_DIR` | `$HOME/dataset/centerline` |
//! | `CTR_CONTRAST` | `t2` |
//! | `CTR_TRAIN_SIZE` | `1` |
//! | `CTR_WORKERS` | CPU 核心数 |
//! | `CTR_METRIC` | `zcoverage` |
//! | `CTR_MANIFEST` | `{CTR_WORK_DIR}/subjects.json` |

use std::env;
use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use ctr_berry::dataset::ExperimentLayout;
use ctr_berry::select::Metric;
use ctr_berry::store::Experiment;
use ctr_berry::EvalResult;

/// 工作目录.
pub const WORK_DIR_VAR: &str = "CTR_WORK_DIR";
/// 对比度.
pub const CONTRAST_VAR: &str = "CTR_CONTRAST";
/// 训练配置大小.
pub const TRAIN_SIZE_VAR: &str = "CTR_TRAIN_SIZE";
/// 工作线程数.
pub const WORKERS_VAR: &str = "CTR_WORKERS";
/// 关注的指标.
pub const METRIC_VAR: &str = "CTR_METRIC";
/// 受试者清单路径.
pub const MANIFEST_VAR: &str = "CTR_MANIFEST";

/// 一次批量评估的全部参数.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// 工作目录.
    pub work_dir: PathBuf,
    /// 实验.
    pub experiment: Experiment,
    /// 工作线程数.
    pub workers: NonZeroUsize,
    /// 关注的指标.
    pub metric: Metric,
    /// 受试者清单路径.
    pub manifest: PathBuf,
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            log::warn!("`{name}={v}` 无法解析, 使用默认值");
            default
        }),
        None => default,
    }
}

impl RunConfig {
    /// 从进程环境变量读取.
    pub fn from_env() -> EvalResult<Self> {
        Self::from_lookup(|k| env::var(k).ok().filter(|v| !v.is_empty()))
    }

    /// 从任意键值来源读取. `lookup` 返回 `None` 表示未设置.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> EvalResult<Self> {
        let work_dir = match lookup(WORK_DIR_VAR) {
            Some(d) => PathBuf::from(d),
            None => ctr_berry::dataset::home_dataset_dir_with(["centerline"]).ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "无法确定用户主目录")
            })?,
        };

        let contrast = lookup(CONTRAST_VAR).unwrap_or_else(|| "t2".to_owned());
        let size = parse_or(TRAIN_SIZE_VAR, lookup(TRAIN_SIZE_VAR), 1usize);
        let workers = parse_or(WORKERS_VAR, lookup(WORKERS_VAR), crate::cpus());
        let metric = match lookup(METRIC_VAR) {
            Some(m) => m.parse()?,
            None => Metric::ZCoverage,
        };
        let manifest = lookup(MANIFEST_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| work_dir.join("subjects.json"));

        Ok(Self {
            work_dir,
            experiment: Experiment::new(contrast, size),
            workers,
            metric,
            manifest,
        })
    }

    /// 实验目录布局.
    #[inline]
    pub fn layout(&self) -> ExperimentLayout {
        ExperimentLayout::new(&self.work_dir, self.experiment.clone())
    }
}
