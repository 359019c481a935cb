//! 按分组整理筛选输入.

use std::collections::BTreeMap;

use super::Metric;
use crate::dataset::TrainerConfiguration;
use crate::partition::PartitionIndex;
use crate::store::{AggregateResult, RecordBackend, ResultStore};
use crate::{EvalResult, Stat};

/// 参与分组筛选的训练配置范围.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum TrainerScope {
    /// 只考虑全部训练受试者都属于该组的配置.
    #[default]
    InGroup,
    /// 考虑所有配置, 该组只作为测试人群.
    All,
}

/// 对每个训练配置, 统计其在组 `group` 内测试受试者上的 `metric` 均值和标准差.
///
/// 1. 测试受试者取缓存中该配置已有结果的受试者, 与 `group` 求交,
///   并去除该配置自身的训练受试者;
/// 2. 指标为空的结果不参与统计; 没有任何有效值的配置不出现在返回值中;
/// 3. 组名不存在时返回空结果.
///
/// # 错误
///
/// 训练受试者不在 `partition` 中时返回 [`crate::EvalError::PartitionInconsistency`].
pub fn summarize_for_group<B: RecordBackend>(
    store: &ResultStore<B>,
    configurations: &[TrainerConfiguration],
    partition: &PartitionIndex,
    group: &str,
    metric: Metric,
    scope: TrainerScope,
) -> EvalResult<BTreeMap<String, Stat>> {
    let Some(members) = partition.group(group) else {
        return Ok(BTreeMap::new());
    };

    let mut ans = BTreeMap::new();
    for cfg in configurations {
        let in_scope = match scope {
            TrainerScope::InGroup => partition.trained_in(cfg, group)?,
            TrainerScope::All => {
                partition.check_configuration(cfg)?;
                true
            }
        };
        if !in_scope {
            continue;
        }

        let tested: Vec<String> = store
            .test_subjects(cfg)?
            .into_iter()
            .filter(|s| members.contains(s) && !cfg.trains_on(s))
            .collect();
        let values: Vec<f64> = store
            .require_pairs(cfg, &tested)?
            .iter()
            .filter_map(|r| metric.of(r))
            .collect();
        if let Some(stat) = Stat::of(&values) {
            ans.insert(cfg.id(), stat);
        }
    }
    Ok(ans)
}

/// 直接以聚合结果作为筛选输入. 该指标为空的配置被忽略.
pub fn stats_from_aggregates<'a, I>(aggregates: I, metric: Metric) -> BTreeMap<String, Stat>
where
    I: IntoIterator<Item = (&'a TrainerConfiguration, &'a AggregateResult)>,
{
    aggregates
        .into_iter()
        .filter_map(|(cfg, a)| Some((cfg.id(), metric.of_aggregate(a)?)))
        .collect()
}
