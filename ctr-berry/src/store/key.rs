//! 缓存键.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::TrainerConfiguration;
use crate::SubjectId;

/// 一次实验: 对比度 + 训练配置大小. 缓存键的前缀.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Experiment {
    /// 采集对比度.
    pub contrast: String,

    /// 训练配置大小 (训练受试者个数).
    pub size: usize,
}

impl Experiment {
    /// 初始化.
    pub fn new(contrast: impl Into<String>, size: usize) -> Self {
        Self {
            contrast: contrast.into(),
            size,
        }
    }

    /// 训练配置所属的实验.
    pub fn of(cfg: &TrainerConfiguration) -> Self {
        Self::new(cfg.contrast(), cfg.size())
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.contrast, self.size)
    }
}

/// 缓存键 `(对比度, 配置大小, 配置标识符[, 测试受试者])`.
///
/// `subject` 为 `None` 时指向该配置的聚合结果.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// 实验.
    pub experiment: Experiment,

    /// 训练配置标识符.
    pub configuration: String,

    /// 测试受试者.
    pub subject: Option<SubjectId>,
}

impl RecordKey {
    /// 单受试者结果的键.
    pub fn pair(cfg: &TrainerConfiguration, subject: &str) -> Self {
        Self {
            experiment: Experiment::of(cfg),
            configuration: cfg.id(),
            subject: Some(subject.to_owned()),
        }
    }

    /// 聚合结果的键.
    pub fn aggregate(cfg: &TrainerConfiguration) -> Self {
        Self {
            experiment: Experiment::of(cfg),
            configuration: cfg.id(),
            subject: None,
        }
    }

    /// 是否指向聚合结果.
    #[inline]
    pub fn is_aggregate(&self) -> bool {
        self.subject.is_none()
    }

    /// 键对应的训练配置.
    pub fn trainer_configuration(&self) -> TrainerConfiguration {
        TrainerConfiguration::from_id(self.experiment.contrast.as_str(), &self.configuration)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(s) => write!(f, "{}/{}/{}", self.experiment, self.configuration, s),
            None => write!(f, "{}/{}", self.experiment, self.configuration),
        }
    }
}
