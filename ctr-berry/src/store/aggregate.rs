//! 训练配置级别的聚合结果.

use serde::{Deserialize, Serialize};

use crate::consts::policy::FAIL_MAXMOVE_MM;
use crate::dataset::TrainerConfiguration;
use crate::metric::MetricResult;
use crate::stats::round2;
use crate::{Stat, SubjectId};

/// 单个训练配置在其全部测试受试者上的聚合结果. 所有浮点字段保留两位小数.
///
/// # 空值处理
///
/// 1. `avg_*` 与 `std_*` 只统计该指标非空的测试结果; 全部为空时为 `None`.
/// 2. `cmpt_fail_subj_test` 的分母是全部测试受试者 (包括指标为空者),
///   `maxmove` 为空的受试者不计为失败. 没有测试受试者时为 `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// 平均 mse (毫米).
    pub avg_mse: Option<f64>,

    /// 平均 maxmove (毫米).
    pub avg_maxmove: Option<f64>,

    /// 平均 zcoverage (百分比).
    pub avg_zcoverage: Option<f64>,

    /// mse 的总体标准差.
    pub std_mse: Option<f64>,

    /// maxmove 的总体标准差.
    pub std_maxmove: Option<f64>,

    /// zcoverage 的总体标准差.
    pub std_zcoverage: Option<f64>,

    /// `maxmove >= 10mm` 的测试受试者百分比.
    pub cmpt_fail_subj_test: Option<f64>,

    /// 训练耗时 (秒), 由外部提供.
    pub bootstrap_time: f64,

    /// 训练受试者.
    pub iteration: Vec<SubjectId>,

    /// 测试受试者个数.
    pub n_test: usize,
}

fn column(results: &[MetricResult], f: impl Fn(&MetricResult) -> Option<f64>) -> Option<Stat> {
    let values: Vec<f64> = results.iter().filter_map(f).collect();
    Stat::of(&values)
}

impl AggregateResult {
    /// 由某训练配置的全部测试结果计算.
    pub fn from_results(
        cfg: &TrainerConfiguration,
        results: &[MetricResult],
        bootstrap_time: f64,
    ) -> Self {
        let mse = column(results, |r| r.mse);
        let maxmove = column(results, |r| r.maxmove);
        let zcoverage = column(results, |r| r.zcoverage);

        let cmpt_fail_subj_test = (!results.is_empty()).then(|| {
            let fails = results
                .iter()
                .filter(|r| r.maxmove.is_some_and(|m| m >= FAIL_MAXMOVE_MM))
                .count();
            round2(fails as f64 * 100.0 / results.len() as f64)
        });

        let mean = |s: Option<Stat>| s.map(|s| round2(s.mean));
        let std = |s: Option<Stat>| s.map(|s| round2(s.std));

        Self {
            avg_mse: mean(mse),
            avg_maxmove: mean(maxmove),
            avg_zcoverage: mean(zcoverage),
            std_mse: std(mse),
            std_maxmove: std(maxmove),
            std_zcoverage: std(zcoverage),
            cmpt_fail_subj_test,
            bootstrap_time: round2(bootstrap_time),
            iteration: cfg.subjects().to_vec(),
            n_test: results.len(),
        }
    }
}
