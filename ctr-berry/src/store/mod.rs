//! 幂等结果缓存.
//!
//! 每个 (训练配置, 测试受试者) 的 [`MetricResult`] 和每个训练配置的
//! [`AggregateResult`] 都只计算并持久化一次, 之后的调用只读缓存.
//! 中途失败的批量评估可以直接重跑, 只会计算缺失的部分.
//!
//! 记录以 `bincode` 编码, 存储交给 [`RecordBackend`].

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dataset::{PredictionRecord, TrainerConfiguration};
use crate::metric::MetricResult;
use crate::{EvalError, EvalResult, SubjectId};

mod aggregate;
mod backend;
mod key;

pub use aggregate::AggregateResult;
pub use backend::{FileBackend, MemoryBackend, RecordBackend};
pub use key::{Experiment, RecordKey};

type KeyLock = Arc<Mutex<()>>;

/// 结果缓存.
///
/// 不同键的 [`get_or_compute`](Self::get_or_compute) 可以并发执行;
/// 同一个键的并发调用在进程内互斥, 只有一个调用者会执行计算.
/// 跨进程时由后端的 "只写一次" 保证最终只有一份结果.
#[derive(Debug)]
pub struct ResultStore<B> {
    backend: B,
    locks: Mutex<HashMap<RecordKey, KeyLock>>,
}

impl<B: RecordBackend> ResultStore<B> {
    /// 初始化.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 存储后端.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn key_lock(&self, key: &RecordKey) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// 没有其他线程持有或等待该键时, 从锁表中移除.
    ///
    /// 键锁的克隆和释放都在持有锁表时进行, 因此这里的引用计数是准确的.
    fn release_lock(&self, key: &RecordKey, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// 读取并解码记录.
    pub fn get<T: DeserializeOwned>(&self, key: &RecordKey) -> EvalResult<Option<T>> {
        match self.backend.load(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// 缓存中是否已有该键.
    #[inline]
    pub fn contains(&self, key: &RecordKey) -> EvalResult<bool> {
        Ok(self.backend.load(key)?.is_some())
    }

    /// 若缓存中已有 `key`, 直接返回; 否则调用 `compute`, 持久化并返回其结果.
    ///
    /// `compute` 失败时不会写入任何内容, 以后的调用会重新计算.
    pub fn get_or_compute<T, F>(&self, key: &RecordKey, compute: F) -> EvalResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> EvalResult<T>,
    {
        if let Some(v) = self.get(key)? {
            log::debug!("cache hit: {key}");
            return Ok(v);
        }

        let lock = self.key_lock(key);
        let ans = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.compute_locked(key, compute)
        };
        self.release_lock(key, lock);
        ans
    }

    /// 持有键锁时调用.
    fn compute_locked<T, F>(&self, key: &RecordKey, compute: F) -> EvalResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> EvalResult<T>,
    {
        // 等锁期间可能已有其他线程写入.
        if let Some(v) = self.get(key)? {
            log::debug!("cache hit after wait: {key}");
            return Ok(v);
        }

        log::debug!("cache miss: {key}");
        let value = compute()?;
        let bytes = bincode::serialize(&value)?;
        if self.backend.store(key, &bytes)? {
            Ok(value)
        } else {
            // 其他进程抢先写入, 以已持久化的结果为准.
            log::debug!("lost write race: {key}");
            self.get(key)?.map_or(Ok(value), Ok)
        }
    }

    /// 计算 (或读取缓存中的) 单条预测记录的指标.
    pub fn pair(&self, record: &PredictionRecord) -> EvalResult<MetricResult> {
        let key = RecordKey::pair(&record.configuration, &record.subject);
        self.get_or_compute(&key, || record.evaluate())
    }

    /// 以自定义计算过程获得单受试者指标.
    pub fn pair_with<F>(
        &self,
        cfg: &TrainerConfiguration,
        subject: &str,
        compute: F,
    ) -> EvalResult<MetricResult>
    where
        F: FnOnce() -> EvalResult<MetricResult>,
    {
        self.get_or_compute(&RecordKey::pair(cfg, subject), compute)
    }

    /// 只读地获取单受试者指标.
    #[inline]
    pub fn get_pair(
        &self,
        cfg: &TrainerConfiguration,
        subject: &str,
    ) -> EvalResult<Option<MetricResult>> {
        self.get(&RecordKey::pair(cfg, subject))
    }

    /// 只读地获取聚合结果.
    #[inline]
    pub fn get_aggregate(&self, cfg: &TrainerConfiguration) -> EvalResult<Option<AggregateResult>> {
        self.get(&RecordKey::aggregate(cfg))
    }

    /// 缓存中某实验下已知的所有训练配置, 按标识符升序.
    pub fn configurations(&self, experiment: &Experiment) -> EvalResult<Vec<TrainerConfiguration>> {
        let ids: BTreeSet<String> = self
            .backend
            .keys(experiment)?
            .into_iter()
            .map(|k| k.configuration)
            .collect();
        Ok(ids
            .iter()
            .map(|id| TrainerConfiguration::from_id(experiment.contrast.as_str(), id))
            .collect())
    }

    /// 缓存中某训练配置已有结果的测试受试者, 升序.
    pub fn test_subjects(&self, cfg: &TrainerConfiguration) -> EvalResult<Vec<SubjectId>> {
        let id = cfg.id();
        Ok(self
            .backend
            .keys(&Experiment::of(cfg))?
            .into_iter()
            .filter(|k| k.configuration == id)
            .filter_map(|k| k.subject)
            .collect())
    }

    /// 按顺序获取 `cfg` 在全部 `test_subjects` 上的结果.
    ///
    /// 任何一个缺失时返回 [`EvalError::IncompleteAggregation`], 列出全部缺失者.
    pub fn require_pairs<S: AsRef<str>>(
        &self,
        cfg: &TrainerConfiguration,
        test_subjects: &[S],
    ) -> EvalResult<Vec<MetricResult>> {
        let mut results = Vec::with_capacity(test_subjects.len());
        let mut missing = Vec::new();
        for s in test_subjects {
            match self.get_pair(cfg, s.as_ref())? {
                Some(r) => results.push(r),
                None => missing.push(s.as_ref().to_owned()),
            }
        }
        if missing.is_empty() {
            Ok(results)
        } else {
            Err(EvalError::IncompleteAggregation {
                configuration: cfg.id(),
                missing,
            })
        }
    }

    /// 获取 (或计算并缓存) 训练配置的聚合结果.
    ///
    /// 要求所有 `(cfg, s)`, `s ∈ test_subjects` 的单受试者结果都已在缓存中,
    /// 否则返回 [`EvalError::IncompleteAggregation`] 且不写入任何内容.
    pub fn aggregate<S: AsRef<str>>(
        &self,
        cfg: &TrainerConfiguration,
        test_subjects: &[S],
        bootstrap_time: f64,
    ) -> EvalResult<AggregateResult> {
        self.get_or_compute(&RecordKey::aggregate(cfg), || {
            let results = self.require_pairs(cfg, test_subjects)?;
            Ok(AggregateResult::from_results(cfg, &results, bootstrap_time))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryBackend, RecordKey, ResultStore};
    use crate::dataset::TrainerConfiguration;
    use crate::metric::MetricResult;
    use crate::store::Experiment;
    use crate::EvalError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn metric(maxmove: f64) -> MetricResult {
        MetricResult {
            mse: Some(maxmove / 2.0),
            maxmove: Some(maxmove),
            zcoverage: Some(95.0),
        }
    }

    #[test]
    fn test_get_or_compute_idempotent() {
        let store = ResultStore::new(MemoryBackend::new());
        let cfg = TrainerConfiguration::new("t2", ["a"]);
        let key = RecordKey::pair(&cfg, "b");
        let calls = AtomicUsize::new(0);

        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(metric(1.5))
        };
        let r1: MetricResult = store.get_or_compute(&key, compute).unwrap();
        let r2: MetricResult = store.get_or_compute(&key, compute).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_pair(&cfg, "b").unwrap(), Some(r1));
    }

    #[test]
    fn test_same_key_computed_once_across_threads() {
        let store = Arc::new(ResultStore::new(MemoryBackend::new()));
        let cfg = TrainerConfiguration::new("t2", ["a"]);
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (store, cfg, calls) = (Arc::clone(&store), cfg.clone(), Arc::clone(&calls));
                std::thread::spawn(move || {
                    store
                        .pair_with(&cfg, "b", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(metric(2.0))
                        })
                        .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), metric(2.0));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lock_table_does_not_grow() {
        let store = ResultStore::new(MemoryBackend::new());
        let cfg = TrainerConfiguration::new("t2", ["a"]);
        for i in 0..100 {
            store
                .pair_with(&cfg, &format!("s{i}"), || Ok(metric(1.0)))
                .unwrap();
        }
        // 失败的计算同样要释放键锁.
        store
            .pair_with(&cfg, "bad", || Err(EvalError::PredictedPointMissing { z: 0 }))
            .unwrap_err();
        assert_eq!(store.backend().len(), 100);
        assert!(store.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn test_failure_is_not_cached() {
        let store = ResultStore::new(MemoryBackend::new());
        let cfg = TrainerConfiguration::new("t2", ["a"]);

        let err = store
            .pair_with(&cfg, "b", || Err(EvalError::PredictedPointMissing { z: 3 }))
            .unwrap_err();
        assert!(matches!(err, EvalError::PredictedPointMissing { z: 3 }));
        assert!(store.backend().is_empty());

        let r = store.pair_with(&cfg, "b", || Ok(metric(1.0))).unwrap();
        assert_eq!(r, metric(1.0));
    }

    #[test]
    fn test_incomplete_aggregation() {
        let store = ResultStore::new(MemoryBackend::new());
        let cfg = TrainerConfiguration::new("t2", ["a"]);
        store.pair_with(&cfg, "b", || Ok(metric(1.0))).unwrap();

        let err = store.aggregate(&cfg, &["b", "c", "d"], 0.0).unwrap_err();
        match err {
            EvalError::IncompleteAggregation {
                configuration,
                missing,
            } => {
                assert_eq!(configuration, "a");
                assert_eq!(missing, ["c", "d"]);
            }
            e => panic!("unexpected error: {e}"),
        }
        assert_eq!(store.get_aggregate(&cfg).unwrap(), None);
    }

    #[test]
    fn test_aggregate_scenario_and_discovery() {
        let store = ResultStore::new(MemoryBackend::new());
        let a = TrainerConfiguration::new("t2", ["A"]);
        let subjects = ["s1", "s2", "s3", "s4"];
        for (s, m) in subjects.iter().zip([1.2, 2.5, 12.0, 3.5]) {
            store.pair_with(&a, s, || Ok(metric(m))).unwrap();
        }
        let b = TrainerConfiguration::new("t2", ["B"]);
        store.pair_with(&b, "s1", || Ok(metric(1.0))).unwrap();

        let agg = store.aggregate(&a, &subjects, 12.0).unwrap();
        assert_eq!(agg.avg_maxmove, Some(4.8));
        assert_eq!(agg.cmpt_fail_subj_test, Some(25.0));

        // 第二次直接读缓存, 参数不再起作用.
        let again = store.aggregate(&a, &["nobody"], 0.0).unwrap();
        assert_eq!(again, agg);

        let exp = Experiment::new("t2", 1);
        let cfgs = store.configurations(&exp).unwrap();
        assert_eq!(cfgs, [a.clone(), b]);
        assert_eq!(store.test_subjects(&a).unwrap(), subjects);
    }
}
