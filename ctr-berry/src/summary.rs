//! 报告用统计: 列汇总与离群配置.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::consts::policy::{OUTLIER_DISTANCE_LIMIT, OUTLIER_ZCOVERAGE_LIMIT};
use crate::stats::round2;
use crate::store::AggregateResult;

/// 聚合结果中可以汇总的列.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AggregateColumn {
    /// `avg_mse`.
    AvgMse,
    /// `avg_maxmove`.
    AvgMaxMove,
    /// `cmpt_fail_subj_test`.
    FailRate,
    /// `avg_zcoverage`.
    AvgZCoverage,
    /// `bootstrap_time`.
    BootstrapTime,
}

impl AggregateColumn {
    /// 全部列.
    pub const ALL: [Self; 5] = [
        Self::AvgMse,
        Self::AvgMaxMove,
        Self::FailRate,
        Self::AvgZCoverage,
        Self::BootstrapTime,
    ];

    /// 列名.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AvgMse => "avg_mse",
            Self::AvgMaxMove => "avg_maxmove",
            Self::FailRate => "cmpt_fail_subj_test",
            Self::AvgZCoverage => "avg_zcoverage",
            Self::BootstrapTime => "bootstrap_time",
        }
    }

    /// 取值.
    pub fn of(self, a: &AggregateResult) -> Option<f64> {
        match self {
            Self::AvgMse => a.avg_mse,
            Self::AvgMaxMove => a.avg_maxmove,
            Self::FailRate => a.cmpt_fail_subj_test,
            Self::AvgZCoverage => a.avg_zcoverage,
            Self::BootstrapTime => Some(a.bootstrap_time),
        }
    }

    /// 离群判定: 距离类和失败率大于 10, 覆盖率小于 90. 训练耗时没有离群判定.
    pub fn is_outlier(self, v: f64) -> bool {
        match self {
            Self::AvgMse | Self::AvgMaxMove | Self::FailRate => v > OUTLIER_DISTANCE_LIMIT,
            Self::AvgZCoverage => v < OUTLIER_ZCOVERAGE_LIMIT,
            Self::BootstrapTime => false,
        }
    }
}

/// 一列数值的汇总, 保留两位小数.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// 数值个数.
    pub n: usize,
    /// 均值.
    pub mean: f64,
    /// 总体标准差.
    pub std: f64,
    /// 最小值.
    pub min: f64,
    /// 最大值.
    pub max: f64,
}

impl Summary {
    /// 汇总 `values`. 为空时返回 `None`.
    pub fn of(values: &[f64]) -> Option<Self> {
        let stat = crate::Stat::of(values)?;
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        Some(Self {
            n: values.len(),
            mean: round2(stat.mean),
            std: round2(stat.std),
            min: round2(min),
            max: round2(max),
        })
    }

    /// 汇总聚合结果的某一列, 空值被忽略.
    pub fn of_column<'a, I>(aggregates: I, column: AggregateColumn) -> Option<Self>
    where
        I: IntoIterator<Item = &'a AggregateResult>,
    {
        let values: Vec<f64> = aggregates.into_iter().filter_map(|a| column.of(a)).collect();
        Self::of(&values)
    }
}

/// 每一列的离群配置标识符. 只列出至少有一个离群者的列.
pub fn outliers<'a, I>(aggregates: I) -> BTreeMap<AggregateColumn, BTreeSet<String>>
where
    I: IntoIterator<Item = (&'a str, &'a AggregateResult)>,
{
    let mut ans: BTreeMap<AggregateColumn, BTreeSet<String>> = BTreeMap::new();
    for (id, a) in aggregates {
        for column in AggregateColumn::ALL {
            if column.of(a).is_some_and(|v| column.is_outlier(v)) {
                ans.entry(column).or_default().insert(id.to_owned());
            }
        }
    }
    ans
}

/// 在每个有离群者的列中都离群的配置.
pub fn persistent_outliers(outliers: &BTreeMap<AggregateColumn, BTreeSet<String>>) -> BTreeSet<String> {
    let mut it = outliers.values();
    let Some(first) = it.next() else {
        return BTreeSet::new();
    };
    it.fold(first.clone(), |acc, s| acc.intersection(s).cloned().collect())
}
