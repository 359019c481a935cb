//! 跨分组泛化矩阵.
//!
//! 行为训练组, 列为测试组. 单元格 `(A, B)` 统计 "在 A 上训练的配置在 B 上测试" 的表现:
//! 先对每个在 A 上训练的配置求其在 B 中测试受试者上的指标均值 (排除该配置自身的训练受试者),
//! 再对这些均值求均值和标准差.
//!
//! 矩阵一般不对称.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::dataset::TrainerConfiguration;
use crate::metric::MetricResult;
use crate::partition::{PartitionAxis, PartitionIndex};
use crate::select::Metric;
use crate::store::{RecordBackend, ResultStore};
use crate::{EvalResult, Stat};

/// 泛化矩阵.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneralizationMatrix {
    metric: Metric,
    axis: PartitionAxis,
    groups: Vec<String>,
    cells: Array2<Option<Stat>>,
}

/// 矩阵中的单元格, 供报告使用.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    /// 训练组.
    pub train_group: String,
    /// 测试组.
    pub test_group: String,
    /// 均值和标准差. 没有有效配置时为 `None`.
    pub stat: Option<Stat>,
}

impl GeneralizationMatrix {
    /// 指标.
    #[inline]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// 分组轴.
    #[inline]
    pub fn axis(&self) -> PartitionAxis {
        self.axis
    }

    /// 组名, 即行和列的顺序.
    #[inline]
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    fn position(&self, group: &str) -> Option<usize> {
        self.groups.iter().position(|g| g == group)
    }

    /// 单元格 `(train, test)`. 组名不存在或单元格为空时返回 `None`.
    pub fn cell(&self, train: &str, test: &str) -> Option<Stat> {
        let (i, j) = (self.position(train)?, self.position(test)?);
        self.cells[(i, j)]
    }

    /// 均值矩阵, 空单元格为 `NaN`.
    pub fn means(&self) -> Array2<f64> {
        self.cells.map(|c| c.map_or(f64::NAN, |s| s.mean))
    }

    /// 按行优先顺序列出所有单元格.
    pub fn rows(&self) -> Vec<MatrixCell> {
        self.cells
            .indexed_iter()
            .map(|((i, j), stat)| MatrixCell {
                train_group: self.groups[i].clone(),
                test_group: self.groups[j].clone(),
                stat: *stat,
            })
            .collect()
    }
}

/// 构建泛化矩阵.
///
/// `lookup(cfg, subject)` 返回缓存中的单受试者结果; 缺失的结果和空指标都被跳过.
///
/// # 错误
///
/// 1. 训练配置引用的受试者不在 `partition` 中时返回
///   [`crate::EvalError::PartitionInconsistency`];
/// 2. `lookup` 的错误原样返回.
pub fn build<F>(
    partition: &PartitionIndex,
    configurations: &[TrainerConfiguration],
    metric: Metric,
    mut lookup: F,
) -> EvalResult<GeneralizationMatrix>
where
    F: FnMut(&TrainerConfiguration, &str) -> EvalResult<Option<MetricResult>>,
{
    let groups: Vec<String> = partition.group_names().map(str::to_owned).collect();
    let n = groups.len();

    // (训练组, 测试组) -> 各配置的均值
    let mut per_cfg: BTreeMap<(usize, usize), Vec<f64>> = BTreeMap::new();
    for cfg in configurations {
        partition.check_configuration(cfg)?;
        let Some(train) = groups
            .iter()
            .position(|g| partition.trained_in(cfg, g).unwrap_or(false))
        else {
            // 训练受试者跨越多个组.
            continue;
        };

        for (test, (_, members)) in partition.groups().enumerate() {
            let mut values = Vec::new();
            for s in members.iter().filter(|s| !cfg.trains_on(s)) {
                if let Some(v) = lookup(cfg, s)?.and_then(|r| metric.of(&r)) {
                    values.push(v);
                }
            }
            if let Some(stat) = Stat::of(&values) {
                per_cfg.entry((train, test)).or_default().push(stat.mean);
            }
        }
    }

    let cells = Array2::from_shape_fn((n, n), |idx| {
        per_cfg.get(&idx).and_then(|means| Stat::of(means))
    });
    log::debug!(
        "generalization matrix ({}, {}): {} groups, {} non-empty cells",
        partition.axis(),
        metric,
        n,
        per_cfg.len()
    );

    Ok(GeneralizationMatrix {
        metric,
        axis: partition.axis(),
        groups,
        cells,
    })
}

/// 以结果缓存中的单受试者结果构建泛化矩阵.
pub fn build_from_store<B: RecordBackend>(
    store: &ResultStore<B>,
    partition: &PartitionIndex,
    configurations: &[TrainerConfiguration],
    metric: Metric,
) -> EvalResult<GeneralizationMatrix> {
    build(partition, configurations, metric, |cfg, s| {
        store.get_pair(cfg, s)
    })
}

/// 同 [`build_from_store`], 但指标以名称给出. 名称未知时返回
/// [`crate::EvalError::UnknownMetric`].
pub fn build_by_name<B: RecordBackend>(
    store: &ResultStore<B>,
    partition: &PartitionIndex,
    configurations: &[TrainerConfiguration],
    metric: &str,
) -> EvalResult<GeneralizationMatrix> {
    build_from_store(store, partition, configurations, metric.parse()?)
}

#[cfg(test)]
mod tests {
    use super::{build_by_name, build_from_store};
    use crate::dataset::TrainerConfiguration;
    use crate::metric::MetricResult;
    use crate::partition::{PartitionAxis, PartitionIndex};
    use crate::select::Metric;
    use crate::store::{MemoryBackend, ResultStore};
    use crate::EvalError;

    fn mse(v: f64) -> MetricResult {
        MetricResult {
            mse: Some(v),
            maxmove: Some(v),
            zcoverage: Some(100.0),
        }
    }

    fn fixture() -> (ResultStore<MemoryBackend>, Vec<TrainerConfiguration>, PartitionIndex) {
        let store = ResultStore::new(MemoryBackend::new());
        let a = TrainerConfiguration::new("t2", ["s1"]);
        let b = TrainerConfiguration::new("t2", ["s3"]);
        for (cfg, s, v) in [
            (&a, "s2", 2.0),
            (&a, "s3", 3.0),
            (&a, "s4", 5.0),
            (&b, "s1", 4.0),
            (&b, "s2", 6.0),
        ] {
            store.pair_with(cfg, s, || Ok(mse(v))).unwrap();
        }
        // 自身配对即使存在也不能被计入.
        store.pair_with(&a, "s1", || Ok(mse(100.0))).unwrap();

        let p = PartitionIndex::from_groups(
            PartitionAxis::Pathology,
            [("HC", vec!["s1", "s2"]), ("MS", vec!["s3", "s4"])],
        );
        (store, vec![a, b], p)
    }

    #[test]
    fn test_generalization_scenario() {
        let (store, cfgs, p) = fixture();
        let m = build_from_store(&store, &p, &cfgs, Metric::Mse).unwrap();

        assert_eq!(m.groups(), ["HC", "MS"]);
        assert_eq!(m.axis(), PartitionAxis::Pathology);
        assert_eq!(m.metric(), Metric::Mse);
        assert_eq!(m.cell("HC", "HC").unwrap().mean, 2.0);
        assert_eq!(m.cell("HC", "MS").unwrap().mean, 4.0);
        assert_eq!(m.cell("MS", "HC").unwrap().mean, 5.0);
        assert_eq!(m.cell("MS", "MS"), None);
        assert_eq!(m.cell("HC", "CSM"), None);

        let means = m.means();
        assert!(means[(1, 1)].is_nan());
        assert_eq!(m.rows().len(), 4);
        assert_eq!(m.rows()[1].train_group, "HC");
        assert_eq!(m.rows()[1].test_group, "MS");
    }

    #[test]
    fn test_cell_std_across_configurations() {
        let (store, mut cfgs, p) = fixture();
        let c = TrainerConfiguration::new("t2", ["s2"]);
        for (s, v) in [("s3", 6.0), ("s4", 8.0)] {
            store.pair_with(&c, s, || Ok(mse(v))).unwrap();
        }
        cfgs.push(c);

        let m = build_from_store(&store, &p, &cfgs, Metric::Mse).unwrap();
        // 配置 s1: mean(3, 5) = 4; 配置 s2: mean(6, 8) = 7.
        let cell = m.cell("HC", "MS").unwrap();
        assert_eq!(cell.mean, 5.5);
        assert_eq!(cell.std, 1.5);
    }

    #[test]
    fn test_generalization_errors() {
        let (store, mut cfgs, p) = fixture();
        let err = build_by_name(&store, &p, &cfgs, "rmse").unwrap_err();
        assert!(matches!(err, EvalError::UnknownMetric(_)));

        cfgs.push(TrainerConfiguration::new("t2", ["ghost"]));
        let err = build_from_store(&store, &p, &cfgs, Metric::Mse).unwrap_err();
        assert!(matches!(err, EvalError::PartitionInconsistency { .. }));
    }
}
