//! 并行批量评估.
//!
//! 各 (训练配置, 测试受试者) 之间没有共享的可变状态, 只通过 [`ResultStore`] 协调.
//! 打开 `rayon` feature 时在固定大小的线程池中并行计算, 否则顺序计算.
//! 单个配对的失败只影响该配对, 不会写入缓存, 重跑时会重新计算.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use crate::dataset::{PredictionRecord, TrainerConfiguration};
use crate::metric::MetricResult;
use crate::store::{AggregateResult, RecordBackend, ResultStore};
use crate::{EvalResult, SubjectId};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use crate::EvalError;
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

        fn run_pool<T, F>(records: &[PredictionRecord], workers: NonZeroUsize, op: F) -> EvalResult<Vec<T>>
        where
            T: Send,
            F: Fn(&PredictionRecord) -> T + Sync + Send,
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers.get())
                .thread_name(|i| format!("ctr-eval-{i}"))
                .build()
                .map_err(|e| EvalError::WorkerPool(e.to_string()))?;
            Ok(pool.install(|| records.par_iter().map(op).collect()))
        }
    } else {
        fn run_pool<T, F>(records: &[PredictionRecord], workers: NonZeroUsize, op: F) -> EvalResult<Vec<T>>
        where
            F: Fn(&PredictionRecord) -> T,
        {
            log::debug!("`rayon` feature disabled, running {workers} workers sequentially");
            Ok(records.iter().map(op).collect())
        }
    }
}

/// 单个配对的评估结果.
#[derive(Debug)]
pub struct PairOutcome {
    /// 训练配置.
    pub configuration: TrainerConfiguration,
    /// 测试受试者.
    pub subject: SubjectId,
    /// 指标, 或失败原因.
    pub result: EvalResult<MetricResult>,
}

impl PairOutcome {
    /// 是否成功?
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// 以自定义计算过程评估所有记录. 输出顺序与 `records` 一致.
///
/// 线程池创建失败时返回 [`crate::EvalError::WorkerPool`]; 单个配对的失败记录在
/// [`PairOutcome::result`] 中.
pub fn evaluate_with<B, F>(
    store: &ResultStore<B>,
    records: &[PredictionRecord],
    workers: NonZeroUsize,
    compute: F,
) -> EvalResult<Vec<PairOutcome>>
where
    B: RecordBackend,
    F: Fn(&PredictionRecord) -> EvalResult<MetricResult> + Sync + Send,
{
    log::info!(
        "evaluating {} pairs with {} workers",
        records.len(),
        workers
    );
    let outcomes = run_pool(records, workers, |r| {
        let result = store.pair_with(&r.configuration, &r.subject, || compute(r));
        if let Err(e) = &result {
            log::warn!("{} / {}: {e}", r.configuration, r.subject);
        }
        PairOutcome {
            configuration: r.configuration.clone(),
            subject: r.subject.clone(),
            result,
        }
    })?;

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    log::info!("evaluation done: {} ok, {failed} failed", outcomes.len() - failed);
    Ok(outcomes)
}

/// 读取体数据并评估所有记录. 见 [`evaluate_with`].
#[inline]
pub fn evaluate_records<B: RecordBackend>(
    store: &ResultStore<B>,
    records: &[PredictionRecord],
    workers: NonZeroUsize,
) -> EvalResult<Vec<PairOutcome>> {
    evaluate_with(store, records, workers, PredictionRecord::evaluate)
}

/// 按训练配置聚合 `records` 的结果. 测试受试者取该配置在 `records` 中的所有受试者.
///
/// 必须在所有配对评估结束之后调用. 存在失败配对的配置会得到
/// [`crate::EvalError::IncompleteAggregation`], 其余配置不受影响.
pub fn aggregate_records<B, F>(
    store: &ResultStore<B>,
    records: &[PredictionRecord],
    mut bootstrap_time: F,
) -> BTreeMap<TrainerConfiguration, EvalResult<AggregateResult>>
where
    B: RecordBackend,
    F: FnMut(&TrainerConfiguration) -> EvalResult<f64>,
{
    let mut by_cfg: BTreeMap<&TrainerConfiguration, Vec<&str>> = BTreeMap::new();
    for r in records {
        by_cfg.entry(&r.configuration).or_default().push(&r.subject);
    }

    by_cfg
        .into_iter()
        .map(|(cfg, subjects)| {
            let agg = bootstrap_time(cfg).and_then(|t| store.aggregate(cfg, &subjects, t));
            if let Err(e) = &agg {
                log::warn!("aggregate {cfg}: {e}");
            }
            (cfg.clone(), agg)
        })
        .collect()
}
