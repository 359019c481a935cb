//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{EvalError, EvalResult, Idx2d, Idx3d, Stat, SubjectId};

pub use crate::data::{Affine, NiftiHeaderAttr, NiiVolume, VolumeSlice};

pub use crate::consts::policy;
pub use crate::consts::{CONFIGURATION_SEP, HEALTHY_CONTROL};

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{
    self, ExperimentLayout, PredictionRecord, Subject, SubjectManifest, TrainerConfiguration,
};

pub use crate::metric::MetricResult;

pub use crate::store::{
    AggregateResult, Experiment, FileBackend, MemoryBackend, RecordBackend, RecordKey,
    ResultStore,
};

pub use crate::partition::{ContrastPartitions, PartitionAxis, PartitionCache, PartitionIndex};

pub use crate::select::{CandidateSet, Metric, Selection, ThresholdPolicy, TrainerScope};

pub use crate::generalize::GeneralizationMatrix;

pub use crate::summary::{AggregateColumn, Summary};
