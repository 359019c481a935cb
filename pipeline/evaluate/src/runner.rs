//! 程序运行函数.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use ctr_berry::dataset::{SubjectManifest, TrainerConfiguration};
use ctr_berry::eval;
use ctr_berry::generalize;
use ctr_berry::partition::{ContrastPartitions, PartitionAxis, PartitionCache, PartitionIndex};
use ctr_berry::select::{self, Metric, ThresholdPolicy, TrainerScope};
use ctr_berry::store::{AggregateResult, FileBackend, RecordBackend, ResultStore};
use ctr_berry::summary;
use ctr_berry::{EvalError, EvalResult};
use utils::loader::RunConfig;

use crate::report::{GroupSelection, Report};

/// 实际运行.
pub fn run(cfg: &RunConfig) -> EvalResult<Report> {
    let layout = cfg.layout();
    let manifest = SubjectManifest::load(&cfg.manifest)?;
    let records = layout.prediction_records()?;
    let store = ResultStore::new(FileBackend::new(layout.cache_dir()));
    let partition_cache = PartitionCache::persistent(layout.cache_dir());
    let contrast = cfg.experiment.contrast.as_str();

    log::info!(
        "experiment {}: {} subjects in manifest, {} prediction records",
        cfg.experiment,
        manifest.len(),
        records.len()
    );

    // 分组与逐对评估互不依赖.
    let (partitions, outcomes) = thread::scope(|s| {
        let partitions = s.spawn(|| partition_cache.for_manifest(&manifest, contrast));
        let outcomes = eval::evaluate_records(&store, &records, cfg.workers);
        let partitions = partitions
            .join()
            .map_err(|_| EvalError::WorkerPool("分组线程异常退出".to_owned()))
            .and_then(|p| p);
        (partitions, outcomes)
    });
    let (partitions, outcomes) = (partitions?, outcomes?);

    // 到此所有配对都已结束.
    let aggregates = eval::aggregate_records(&store, &records, |c| layout.bootstrap_time(c));
    let (aggregates, incomplete): (BTreeMap<_, _>, BTreeMap<_, _>) =
        aggregates.into_iter().partition(|(_, a)| a.is_ok());
    let aggregates: BTreeMap<TrainerConfiguration, AggregateResult> = aggregates
        .into_iter()
        .filter_map(|(c, a)| Some((c, a.ok()?)))
        .collect();

    // 聚合失败的配置仍有部分单受试者结果, 分组筛选和泛化矩阵照常使用.
    let configurations: Vec<TrainerConfiguration> = records
        .iter()
        .map(|r| &r.configuration)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    let policy = ThresholdPolicy::default();

    let selections = select_per_group(&store, &configurations, &partitions, &policy)?;

    let overall = select::stats_from_aggregates(&aggregates, cfg.metric);
    let overall = select::select(&overall, cfg.metric, &policy);
    let share = select::share_report(&overall.candidates, &partitions);

    let matrices = PartitionAxis::ALL
        .into_iter()
        .map(|axis| {
            let partition = partitions.get(axis);
            let usable = usable_configurations(partition, &configurations);
            generalize::build_from_store(&store, partition, &usable, cfg.metric)
        })
        .collect::<EvalResult<Vec<_>>>()?;

    let ids: Vec<(String, &AggregateResult)> =
        aggregates.iter().map(|(c, a)| (c.id(), a)).collect();
    let outliers = summary::outliers(ids.iter().map(|(id, a)| (id.as_str(), *a)));

    Ok(Report {
        experiment: cfg.experiment.clone(),
        metric: cfg.metric,
        outcomes,
        incomplete: incomplete
            .into_iter()
            .filter_map(|(c, a)| Some((c, a.err()?.to_string())))
            .collect(),
        aggregates,
        selections,
        overall,
        share,
        matrices,
        outliers,
    })
}

/// 对每个分组轴的每个组, 以及每个指标, 筛选在组内训练的配置.
fn select_per_group<B: RecordBackend>(
    store: &ResultStore<B>,
    configurations: &[TrainerConfiguration],
    partitions: &ContrastPartitions,
    policy: &ThresholdPolicy,
) -> EvalResult<Vec<GroupSelection>> {
    let mut ans = Vec::new();
    for axis in PartitionAxis::ALL {
        let partition = partitions.get(axis);
        let usable = usable_configurations(partition, configurations);
        for group in partition.group_names() {
            for metric in Metric::ALL {
                let stats = select::summarize_for_group(
                    store,
                    &usable,
                    partition,
                    group,
                    metric,
                    TrainerScope::InGroup,
                )?;
                ans.push(GroupSelection {
                    axis,
                    group: group.to_owned(),
                    selection: select::select(&stats, metric, policy),
                });
            }
        }
    }
    Ok(ans)
}

/// 训练受试者全部出现在 `partition` 中的配置. 其余配置在该轴上被跳过.
fn usable_configurations(
    partition: &PartitionIndex,
    configurations: &[TrainerConfiguration],
) -> Vec<TrainerConfiguration> {
    configurations
        .iter()
        .filter(|c| match partition.check_configuration(c) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("skipping `{c}` on {} axis: {e}", partition.axis());
                false
            }
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::run;
    use ctr_berry::dataset::{Subject, SubjectManifest};
    use ctr_berry::partition::PartitionAxis;
    use ctr_berry::select::Metric;
    use ctr_berry::store::Experiment;
    use ndarray::Array3;
    use std::num::NonZeroUsize;
    use std::path::Path;
    use tempfile::TempDir;
    use utils::loader::RunConfig;

    /// `[w, h, z]`.
    const SHAPE: (usize, usize, usize) = (6, 6, 4);

    fn write_volume(path: &Path, points: impl IntoIterator<Item = (usize, usize, usize)>) {
        let mut data = Array3::<f32>::zeros(SHAPE);
        for p in points {
            data[p] = 1.0;
        }
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        nifti::writer::WriterOptions::new(path)
            .write_nifti(&data)
            .unwrap();
    }

    /// 三个受试者, 每个都单独训练一个配置, 预测另外两个.
    ///
    /// 1. `s2` 的预测整体偏移一个体素, 其余配置预测准确;
    /// 2. `s1` 对 `s3` 的预测缺少 `z = 2` 一层;
    /// 3. `s3` 没有病理元数据.
    fn setup() -> (TempDir, RunConfig) {
        let dir = TempDir::new().unwrap();
        let work = dir.path();
        let ids = ["s1", "s2", "s3"];

        let manifest = SubjectManifest::new([
            Subject::new("s1", Some("MS"), [1.0, 1.0, 1.0], "t2"),
            Subject::new("s2", Some(""), [1.0, 1.0, 1.0], "t2"),
            Subject::new("s3", None, [1.0, 1.0, 1.0], "t2"),
        ]);
        let manifest_path = work.join("subjects.json");
        manifest.save(&manifest_path).unwrap();

        let (w, h, nz) = SHAPE;
        for s in ids {
            let gold = work.join(format!("gold_t2/{s}_centerline_gold.nii.gz"));
            write_volume(&gold, (0..nz).map(|z| (2, 2, z)));
            let seg = work.join(format!("input_nii_t2/{s}_seg.nii.gz"));
            let all = (0..w).flat_map(|x| (0..h).flat_map(move |y| (0..nz).map(move |z| (x, y, z))));
            write_volume(&seg, all);
        }

        for trainer in ids {
            for s in ids.into_iter().filter(|s| *s != trainer) {
                let x = if trainer == "s2" { 3 } else { 2 };
                let missing = (trainer, s) == ("s1", "s3");
                let points = (0..nz).filter(|z| !(missing && *z == 2)).map(|z| (x, 2, z));
                let pred = work.join(format!("output_nii_t2_1/{trainer}/{s}_centerline_pred.nii.gz"));
                write_volume(&pred, points);
            }
        }

        let cfg = RunConfig {
            work_dir: work.to_owned(),
            experiment: Experiment::new("t2", 1),
            workers: NonZeroUsize::new(2).unwrap(),
            metric: Metric::Mse,
            manifest: manifest_path,
        };
        (dir, cfg)
    }

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_run() {
        let (_dir, cfg) = setup();
        let report = run(&cfg).unwrap();

        assert_eq!(report.outcomes.len(), 6);
        assert_eq!(report.outcomes.iter().filter(|o| !o.is_ok()).count(), 1);
        assert_eq!(report.incomplete.len(), 1);
        assert_eq!(report.incomplete[0].0.id(), "s1");
        let aggregated: Vec<String> = report.aggregates.keys().map(|c| c.id()).collect();
        assert_eq!(aggregated, ["s2", "s3"]);

        // `s1` 聚合失败, 但它对 `s2` 的结果仍在矩阵中; `s3` 只在分辨率轴上出现.
        let pathology = report
            .matrices
            .iter()
            .find(|m| m.axis() == PartitionAxis::Pathology)
            .unwrap();
        assert_eq!(pathology.groups().to_vec(), ["HC", "MS"]);
        assert!(f64_eq(pathology.cell("MS", "HC").unwrap().mean, 0.0));
        assert!(f64_eq(pathology.cell("HC", "MS").unwrap().mean, 1.0));
        assert!(pathology.cell("HC", "HC").is_none());

        let resolution = report
            .matrices
            .iter()
            .find(|m| m.axis() == PartitionAxis::Resolution)
            .unwrap();
        assert!(f64_eq(resolution.cell("iso", "iso").unwrap().mean, 1.0 / 3.0));

        let iso = report
            .selections
            .iter()
            .find(|g| g.group == "iso" && g.selection.candidates.metric == Metric::Mse)
            .unwrap();
        let ranked: Vec<&str> = iso
            .selection
            .ranking
            .iter()
            .map(|r| r.configuration.as_str())
            .collect();
        assert_eq!(ranked.len(), 3);
        assert!(ranked.contains(&"s1"));

        let mut buf = Vec::new();
        report.describe_into(&mut buf).unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("Failed pairs: 1"));
    }

    #[test]
    fn test_run_is_cached() {
        let (_dir, cfg) = setup();
        let first = run(&cfg).unwrap();
        assert!(cfg.work_dir.join("results/t2_1/s2/aggregate.bin").is_file());

        let second = run(&cfg).unwrap();
        assert_eq!(first.aggregates, second.aggregates);
        assert_eq!(second.incomplete.len(), 1);
    }
}
