//! 训练配置与待评估的预测记录.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::CONFIGURATION_SEP;
use crate::metric::{self, MetricResult};
use crate::{EvalResult, NiiVolume, SubjectId};

/// 训练配置: 一组固定的训练受试者, 用于产生一个预测器实例.
///
/// 受试者顺序是标识符的一部分, 不会被重新排序.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrainerConfiguration {
    contrast: String,
    subjects: Vec<SubjectId>,
}

impl TrainerConfiguration {
    /// 初始化.
    pub fn new<I, S>(contrast: impl Into<String>, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SubjectId>,
    {
        Self {
            contrast: contrast.into(),
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    /// 从标识符 (即各训练受试者以 `__` 连接) 解析.
    pub fn from_id(contrast: impl Into<String>, id: &str) -> Self {
        Self::new(contrast, split_id(id))
    }

    /// 标识符.
    #[inline]
    pub fn id(&self) -> String {
        self.subjects.join(CONFIGURATION_SEP)
    }

    /// 采集对比度.
    #[inline]
    pub fn contrast(&self) -> &str {
        &self.contrast
    }

    /// 训练受试者.
    #[inline]
    pub fn subjects(&self) -> &[SubjectId] {
        &self.subjects
    }

    /// 训练受试者个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.subjects.len()
    }

    /// `subject` 是否是该配置的训练受试者.
    #[inline]
    pub fn trains_on(&self, subject: &str) -> bool {
        self.subjects.iter().any(|s| s == subject)
    }
}

impl fmt::Display for TrainerConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// 将训练配置标识符拆分为训练受试者.
pub fn split_id(id: &str) -> impl Iterator<Item = &str> {
    id.split(CONFIGURATION_SEP).filter(|s| !s.is_empty())
}

/// 一个 (训练配置, 测试受试者) 对应的三份体数据路径.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PredictionRecord {
    /// 训练配置.
    pub configuration: TrainerConfiguration,

    /// 测试受试者.
    pub subject: SubjectId,

    /// 预测中心线.
    pub predicted: PathBuf,

    /// 参考中心线.
    pub gold: PathBuf,

    /// 参考分割.
    pub segmentation: PathBuf,
}

impl PredictionRecord {
    /// 读取三份体数据并计算指标.
    pub fn evaluate(&self) -> EvalResult<MetricResult> {
        let pred = NiiVolume::open(&self.predicted)?;
        let gold = NiiVolume::open(&self.gold)?;
        let seg = NiiVolume::open(&self.segmentation)?;
        metric::compute(&pred, &gold, &seg)
    }
}

#[cfg(test)]
mod tests {
    use super::{split_id, TrainerConfiguration};

    #[test]
    fn test_configuration_id() {
        let c = TrainerConfiguration::new("t2", ["s1", "s7"]);
        assert_eq!(c.id(), "s1__s7");
        assert_eq!(c.size(), 2);
        assert!(c.trains_on("s7"));
        assert!(!c.trains_on("s"));
        assert_eq!(TrainerConfiguration::from_id("t2", "s1__s7"), c);
        assert_eq!(c.to_string(), "s1__s7");

        assert_eq!(split_id("a__b__c").collect::<Vec<_>>(), ["a", "b", "c"]);

        let single = TrainerConfiguration::from_id("t1", "sub_01");
        assert_eq!(single.subjects(), ["sub_01".to_owned()]);
        assert_eq!(single.contrast(), "t1");
    }
}
