//! 实验目录约定.
//!
//! 对某个 `(工作目录, 对比度 cc, 训练配置大小 n)`:
//!
//! ```text
//! {work}/output_nii_{cc}_{n}/{cfg}/{subj}_centerline_pred.nii.gz
//! {work}/output_nii_{cc}_{n}/{cfg}/time.txt
//! {work}/gold_{cc}/{subj}_centerline_gold.nii.gz
//! {work}/input_nii_{cc}/{subj}_seg.nii.gz
//! {work}/results/...                                 (结果缓存)
//! ```
//!
//! 其中 `{cfg}` 为训练受试者以 `__` 连接而成.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{PredictionRecord, TrainerConfiguration};
use crate::stats::round2;
use crate::store::Experiment;
use crate::EvalResult;

const PRED_SUFFIX: &str = "_centerline_pred.nii.gz";
const TIME_FILE: &str = "time.txt";

/// 单个实验的目录布局.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimentLayout {
    work_dir: PathBuf,
    experiment: Experiment,
}

impl ExperimentLayout {
    /// 初始化. 不检查目录是否存在.
    pub fn new<P: AsRef<Path>>(work_dir: P, experiment: Experiment) -> Self {
        Self {
            work_dir: work_dir.as_ref().to_owned(),
            experiment,
        }
    }

    /// 实验标识.
    #[inline]
    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// 工作目录.
    #[inline]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// 预测结果根目录, 每个训练配置一个子目录.
    pub fn output_dir(&self) -> PathBuf {
        let Experiment { contrast, size } = &self.experiment;
        self.work_dir.join(format!("output_nii_{contrast}_{size}"))
    }

    /// 某训练配置的预测结果目录.
    pub fn configuration_dir(&self, cfg: &TrainerConfiguration) -> PathBuf {
        self.output_dir().join(cfg.id())
    }

    /// 预测中心线路径.
    pub fn predicted_path(&self, cfg: &TrainerConfiguration, subject: &str) -> PathBuf {
        self.configuration_dir(cfg)
            .join(format!("{subject}{PRED_SUFFIX}"))
    }

    /// 参考中心线路径.
    pub fn gold_path(&self, subject: &str) -> PathBuf {
        self.work_dir
            .join(format!("gold_{}", self.experiment.contrast))
            .join(format!("{subject}_centerline_gold.nii.gz"))
    }

    /// 参考分割路径.
    pub fn segmentation_path(&self, subject: &str) -> PathBuf {
        self.work_dir
            .join(format!("input_nii_{}", self.experiment.contrast))
            .join(format!("{subject}_seg.nii.gz"))
    }

    /// 结果缓存根目录.
    pub fn cache_dir(&self) -> PathBuf {
        self.work_dir.join("results")
    }

    /// 构造单条预测记录.
    pub fn record(&self, cfg: &TrainerConfiguration, subject: &str) -> PredictionRecord {
        PredictionRecord {
            configuration: cfg.clone(),
            subject: subject.to_owned(),
            predicted: self.predicted_path(cfg, subject),
            gold: self.gold_path(subject),
            segmentation: self.segmentation_path(subject),
        }
    }

    /// 列出预测结果根目录下的所有训练配置 (忽略隐藏项和普通文件), 按标识符排序.
    pub fn configurations(&self) -> EvalResult<Vec<TrainerConfiguration>> {
        let mut ans = Vec::new();
        for entry in fs::read_dir(self.output_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                log::warn!("跳过非 UTF-8 目录 {:?}", entry.path());
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            ans.push(TrainerConfiguration::from_id(
                self.experiment.contrast.as_str(),
                name,
            ));
        }
        ans.sort_by_key(TrainerConfiguration::id);
        Ok(ans)
    }

    /// 某训练配置已有预测结果的测试受试者, 按标识符排序.
    pub fn test_subjects(&self, cfg: &TrainerConfiguration) -> EvalResult<Vec<String>> {
        let mut ans: Vec<String> = fs::read_dir(self.configuration_dir(cfg))?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().into_string().ok()?;
                name.strip_suffix(PRED_SUFFIX).map(str::to_owned)
            })
            .collect();
        ans.sort();
        Ok(ans)
    }

    /// 所有训练配置下的所有预测记录.
    pub fn prediction_records(&self) -> EvalResult<Vec<PredictionRecord>> {
        let mut ans = Vec::new();
        for cfg in self.configurations()? {
            for subject in self.test_subjects(&cfg)? {
                ans.push(self.record(&cfg, &subject));
            }
        }
        Ok(ans)
    }

    /// 训练耗时 (秒), 保留两位小数. `time.txt` 不存在时为 0.
    pub fn bootstrap_time(&self, cfg: &TrainerConfiguration) -> EvalResult<f64> {
        let path = self.configuration_dir(cfg).join(TIME_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0.0),
            Err(e) => return Err(e.into()),
        };
        match text.trim().parse::<f64>() {
            Ok(v) => Ok(round2(v)),
            Err(_) => {
                log::warn!("{path:?} 内容无法解析为秒数, 按 0 处理");
                Ok(0.0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExperimentLayout;
    use crate::dataset::TrainerConfiguration;
    use crate::store::Experiment;
    use std::fs;

    fn layout(root: &std::path::Path) -> ExperimentLayout {
        ExperimentLayout::new(root, Experiment::new("t2", 1))
    }

    #[test]
    fn test_paths() {
        let l = layout(std::path::Path::new("/w"));
        let cfg = TrainerConfiguration::new("t2", ["a", "b"]);
        assert_eq!(
            l.predicted_path(&cfg, "c"),
            std::path::PathBuf::from("/w/output_nii_t2_1/a__b/c_centerline_pred.nii.gz")
        );
        assert_eq!(
            l.gold_path("c"),
            std::path::PathBuf::from("/w/gold_t2/c_centerline_gold.nii.gz")
        );
        assert_eq!(
            l.segmentation_path("c"),
            std::path::PathBuf::from("/w/input_nii_t2/c_seg.nii.gz")
        );
    }

    #[test]
    fn test_discover_records_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let l = layout(dir.path());
        let out = l.output_dir();
        fs::create_dir_all(out.join("s1")).unwrap();
        fs::create_dir_all(out.join("s2")).unwrap();
        fs::create_dir_all(out.join(".hidden")).unwrap();
        fs::write(out.join("notes.txt"), "x").unwrap();

        for (cfg, subj) in [("s1", "s2"), ("s1", "s3"), ("s2", "s1")] {
            fs::write(out.join(cfg).join(format!("{subj}_centerline_pred.nii.gz")), b"").unwrap();
        }
        fs::write(out.join("s1").join("time.txt"), "12.3456\n").unwrap();
        fs::write(out.join("s2").join("time.txt"), "oops").unwrap();

        let cfgs = l.configurations().unwrap();
        assert_eq!(cfgs.iter().map(|c| c.id()).collect::<Vec<_>>(), ["s1", "s2"]);

        let records = l.prediction_records().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].subject, "s2");
        assert_eq!(records[1].subject, "s3");
        assert_eq!(records[2].configuration.id(), "s2");

        assert_eq!(l.bootstrap_time(&cfgs[0]).unwrap(), 12.35);
        assert_eq!(l.bootstrap_time(&cfgs[1]).unwrap(), 0.0);
        let missing = TrainerConfiguration::new("t2", ["nope"]);
        assert_eq!(l.bootstrap_time(&missing).unwrap(), 0.0);
    }
}
