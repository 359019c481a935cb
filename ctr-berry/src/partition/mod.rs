//! 受试者分组.
//!
//! 同一对比度下的受试者沿两个相互独立的轴分组:
//!
//! 1. 病理标签. 空标签并入 `HC`, 没有病理元数据的受试者不进入任何组;
//! 2. 采集分辨率类别 `iso` / `sag` / `ax`. 该分组覆盖全部受试者.
//!
//! 同一个 [`PartitionIndex`] 内的各组两两不交.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::{Subject, TrainerConfiguration};
use crate::{EvalError, EvalResult, SubjectId};

mod cache;

pub use cache::{ContrastPartitions, PartitionCache};

/// 分组轴.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionAxis {
    /// 按病理标签.
    Pathology,
    /// 按采集分辨率类别.
    Resolution,
}

impl PartitionAxis {
    /// 两个分组轴.
    pub const ALL: [Self; 2] = [Self::Pathology, Self::Resolution];

    /// 名称.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pathology => "pathology",
            Self::Resolution => "resolution",
        }
    }
}

impl fmt::Display for PartitionAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 采集分辨率类别.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionClass {
    /// 三个方向分辨率 (取整后) 相同.
    Iso,
    /// 层间分辨率比至少一个层内方向更精细, 即非轴位采集.
    Sag,
    /// 其余情况.
    Ax,
}

impl ResolutionClass {
    /// 由 `[rx, ry, rz]` 判断类别. 比较前各分量先四舍五入到整数.
    pub fn classify(resolution: [f64; 3]) -> Self {
        let [rx, ry, rz] = resolution.map(f64::round);
        if rx == ry && ry == rz {
            Self::Iso
        } else if rz < rx || rz < ry {
            Self::Sag
        } else {
            Self::Ax
        }
    }

    /// 分组名.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Iso => "iso",
            Self::Sag => "sag",
            Self::Ax => "ax",
        }
    }
}

/// 单个分组轴上的分组结果: 组名 → 受试者集合. 组名按字典序排列.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIndex {
    axis: PartitionAxis,
    groups: BTreeMap<String, BTreeSet<SubjectId>>,
}

impl PartitionIndex {
    fn from_pairs<I: IntoIterator<Item = (String, SubjectId)>>(axis: PartitionAxis, it: I) -> Self {
        let mut groups: BTreeMap<String, BTreeSet<SubjectId>> = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for (group, subject) in it {
            // 每个受试者只进入一个组.
            if seen.insert(subject.clone()) {
                groups.entry(group).or_default().insert(subject);
            }
        }
        Self { axis, groups }
    }

    /// 直接由组名和受试者构造, 主要用于测试.
    ///
    /// 同一受试者出现在多个组时, 只保留第一次出现.
    pub fn from_groups<I, G, S>(axis: PartitionAxis, groups: I) -> Self
    where
        I: IntoIterator<Item = (G, Vec<S>)>,
        G: Into<String>,
        S: Into<SubjectId>,
    {
        Self::from_pairs(
            axis,
            groups.into_iter().flat_map(|(g, ss)| {
                let g: String = g.into();
                ss.into_iter().map(move |s| (g.clone(), s.into()))
            }),
        )
    }

    /// 分组轴.
    #[inline]
    pub fn axis(&self) -> PartitionAxis {
        self.axis
    }

    /// 组名, 按字典序.
    pub fn group_names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// 所有组.
    pub fn groups(&self) -> impl ExactSizeIterator<Item = (&str, &BTreeSet<SubjectId>)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 组个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// 是否没有任何组?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 某组的受试者.
    #[inline]
    pub fn group(&self, name: &str) -> Option<&BTreeSet<SubjectId>> {
        self.groups.get(name)
    }

    /// 所有组的并集.
    pub fn subjects(&self) -> BTreeSet<&str> {
        self.groups
            .values()
            .flat_map(|g| g.iter().map(String::as_str))
            .collect()
    }

    /// 受试者所属的组.
    pub fn group_of(&self, subject: &str) -> Option<&str> {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(subject))
            .map(|(name, _)| name.as_str())
    }

    /// 同 [`Self::group_of`], 但受试者不在索引中时返回 [`EvalError::PartitionInconsistency`].
    pub fn require_group_of(&self, subject: &str) -> EvalResult<&str> {
        self.group_of(subject)
            .ok_or_else(|| EvalError::PartitionInconsistency {
                subject: subject.to_owned(),
                axis: self.axis.name(),
            })
    }

    /// 检查训练配置引用的所有受试者都在索引中.
    pub fn check_configuration(&self, cfg: &TrainerConfiguration) -> EvalResult<()> {
        cfg.subjects()
            .iter()
            .try_for_each(|s| self.require_group_of(s).map(|_| ()))
    }

    /// 训练配置是否 "在组 `group` 上训练", 即其全部训练受试者都属于该组.
    ///
    /// 训练受试者不在索引中时返回 [`EvalError::PartitionInconsistency`].
    pub fn trained_in(&self, cfg: &TrainerConfiguration, group: &str) -> EvalResult<bool> {
        let mut ans = !cfg.subjects().is_empty();
        for s in cfg.subjects() {
            ans &= self.require_group_of(s)? == group;
        }
        Ok(ans)
    }
}

/// 按病理标签分组. 空标签并入 `HC`, 没有病理元数据的受试者被忽略.
pub fn build_pathology<'a, I: IntoIterator<Item = &'a Subject>>(subjects: I) -> PartitionIndex {
    PartitionIndex::from_pairs(
        PartitionAxis::Pathology,
        subjects
            .into_iter()
            .filter_map(|s| Some((s.pathology_group()?.to_owned(), s.id.clone()))),
    )
}

/// 按采集分辨率类别分组, 覆盖全部受试者.
pub fn build_resolution<'a, I: IntoIterator<Item = &'a Subject>>(subjects: I) -> PartitionIndex {
    PartitionIndex::from_pairs(
        PartitionAxis::Resolution,
        subjects.into_iter().map(|s| {
            let class = ResolutionClass::classify(s.resolution);
            (class.name().to_owned(), s.id.clone())
        }),
    )
}
