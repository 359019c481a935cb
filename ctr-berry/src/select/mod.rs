//! 训练配置筛选.
//!
//! 对每个指标, 按均值为训练配置排序 (mse, maxmove 升序; zcoverage 降序),
//! 并按阈值策略选出候选配置. 未通过阈值的配置仍保留在排序结果中, 供报告使用.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::consts::policy;
use crate::metric::MetricResult;
use crate::store::AggregateResult;
use crate::{EvalError, EvalResult, Stat};

mod group;
mod share;

pub use group::{stats_from_aggregates, summarize_for_group, TrainerScope};
pub use share::{share_report, GroupShare, ShareReport};

/// 评估指标.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Metric {
    /// 均方根平面距离.
    Mse,
    /// 最大平面距离.
    MaxMove,
    /// 覆盖率.
    ZCoverage,
}

impl Metric {
    /// 全部指标.
    pub const ALL: [Self; 3] = [Self::Mse, Self::MaxMove, Self::ZCoverage];

    /// 名称.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mse => "mse",
            Self::MaxMove => "maxmove",
            Self::ZCoverage => "zcoverage",
        }
    }

    /// 值越小越好?
    #[inline]
    pub const fn lower_is_better(self) -> bool {
        !matches!(self, Self::ZCoverage)
    }

    /// 从单受试者结果中取出该指标.
    #[inline]
    pub fn of(self, r: &MetricResult) -> Option<f64> {
        match self {
            Self::Mse => r.mse,
            Self::MaxMove => r.maxmove,
            Self::ZCoverage => r.zcoverage,
        }
    }

    /// 从聚合结果中取出该指标的均值和标准差.
    pub fn of_aggregate(self, a: &AggregateResult) -> Option<Stat> {
        let (mean, std) = match self {
            Self::Mse => (a.avg_mse, a.std_mse),
            Self::MaxMove => (a.avg_maxmove, a.std_maxmove),
            Self::ZCoverage => (a.avg_zcoverage, a.std_zcoverage),
        };
        Some(Stat {
            mean: mean?,
            std: std.unwrap_or(0.0),
        })
    }

    /// 按 "好坏" 比较两个值, 好的排在前面.
    #[inline]
    fn rank_cmp(self, a: f64, b: f64) -> Ordering {
        let ord = OrderedFloat(a).cmp(&OrderedFloat(b));
        if self.lower_is_better() {
            ord
        } else {
            ord.reverse()
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EvalError::UnknownMetric(s.to_owned()))
    }
}

/// 阈值策略. 默认值见 [`policy`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    /// mse 须严格小于该值.
    pub mse_below: f64,
    /// maxmove 须严格小于该值.
    pub maxmove_below: f64,
    /// zcoverage 须严格大于该值.
    pub zcoverage_above: f64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            mse_below: policy::MSE_THRESHOLD_MM,
            maxmove_below: policy::MAXMOVE_THRESHOLD_MM,
            zcoverage_above: policy::ZCOVERAGE_THRESHOLD_PCT,
        }
    }
}

impl ThresholdPolicy {
    /// 某指标的阈值.
    pub fn threshold(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mse => self.mse_below,
            Metric::MaxMove => self.maxmove_below,
            Metric::ZCoverage => self.zcoverage_above,
        }
    }

    /// 替换某指标的阈值.
    pub fn with_threshold(mut self, metric: Metric, value: f64) -> Self {
        match metric {
            Metric::Mse => self.mse_below = value,
            Metric::MaxMove => self.maxmove_below = value,
            Metric::ZCoverage => self.zcoverage_above = value,
        }
        self
    }

    /// `value` 是否通过某指标的阈值.
    pub fn accepts(&self, metric: Metric, value: f64) -> bool {
        let t = self.threshold(metric);
        if metric.lower_is_better() {
            value < t
        } else {
            value > t
        }
    }
}

/// 排序结果中的一项.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    /// 训练配置标识符.
    pub configuration: String,
    /// 该指标的均值和标准差.
    pub stat: Stat,
    /// 是否通过阈值.
    pub accepted: bool,
}

/// 候选配置集合: 训练配置标识符 → 均值和标准差.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// 指标.
    pub metric: Metric,
    /// 通过阈值的配置.
    pub candidates: BTreeMap<String, Stat>,
}

impl CandidateSet {
    /// 是否包含该配置?
    #[inline]
    pub fn contains(&self, configuration: &str) -> bool {
        self.candidates.contains_key(configuration)
    }

    /// 候选个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// 是否为空?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// 候选配置标识符, 升序.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.candidates.keys().map(String::as_str)
    }
}

/// 筛选结果.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// 全部配置, 好的在前; 同值时按标识符升序.
    pub ranking: Vec<Ranked>,
    /// 通过阈值的配置.
    pub candidates: CandidateSet,
}

/// 对 `stats` 中的训练配置按 `metric` 排序并筛选.
///
/// `stats` 为空时返回空结果, 不是错误.
pub fn select(stats: &BTreeMap<String, Stat>, metric: Metric, policy: &ThresholdPolicy) -> Selection {
    let mut ranking: Vec<Ranked> = stats
        .iter()
        .map(|(id, stat)| Ranked {
            configuration: id.clone(),
            stat: *stat,
            accepted: policy.accepts(metric, stat.mean),
        })
        .collect();
    // `stats` 已按标识符升序, 稳定排序保留同值时的顺序.
    ranking.sort_by(|a, b| metric.rank_cmp(a.stat.mean, b.stat.mean));

    let candidates = ranking
        .iter()
        .filter(|r| r.accepted)
        .map(|r| (r.configuration.clone(), r.stat))
        .collect();

    Selection {
        ranking,
        candidates: CandidateSet { metric, candidates },
    }
}

/// 同 [`select`], 但指标以名称给出. 名称未知时返回 [`EvalError::UnknownMetric`].
pub fn select_by_name(
    stats: &BTreeMap<String, Stat>,
    metric: &str,
    policy: &ThresholdPolicy,
) -> EvalResult<Selection> {
    Ok(select(stats, metric.parse()?, policy))
}
