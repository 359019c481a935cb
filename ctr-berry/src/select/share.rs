//! 候选配置在各分组中的占比.
//!
//! "好的训练受试者" 即出现在某个候选配置中的训练受试者.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{CandidateSet, Metric};
use crate::dataset::split_id;
use crate::partition::{ContrastPartitions, PartitionAxis};
use crate::stats::round2;

/// 单个分组中好的训练受试者占比.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupShare {
    /// 分组轴.
    pub axis: PartitionAxis,
    /// 组名.
    pub group: String,
    /// 组内受试者个数.
    pub total: usize,
    /// 组内好的训练受试者个数.
    pub good: usize,
    /// 百分比, 保留两位小数.
    pub percent: f64,
}

/// 占比报告.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShareReport {
    /// 指标.
    pub metric: Metric,
    /// 好的训练受试者, 升序.
    pub good_trainers: Vec<String>,
    /// 全部受试者个数 (以分辨率分组的并集为准).
    pub universe: usize,
    /// 好的训练受试者占全部受试者的百分比.
    pub percent: f64,
    /// 各组占比, 先分辨率分组后病理分组.
    pub groups: Vec<GroupShare>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(part as f64 * 100.0 / total as f64)
    }
}

/// 统计候选配置的训练受试者在各分组中的占比.
pub fn share_report(candidates: &CandidateSet, partitions: &ContrastPartitions) -> ShareReport {
    let good: BTreeSet<&str> = candidates.ids().flat_map(split_id).collect();

    let mut groups = Vec::new();
    for axis in [PartitionAxis::Resolution, PartitionAxis::Pathology] {
        for (name, members) in partitions.get(axis).groups() {
            let hit = members.iter().filter(|m| good.contains(m.as_str())).count();
            groups.push(GroupShare {
                axis,
                group: name.to_owned(),
                total: members.len(),
                good: hit,
                percent: percent(hit, members.len()),
            });
        }
    }

    let universe = partitions.resolution.subjects().len();
    ShareReport {
        metric: candidates.metric,
        good_trainers: good.iter().map(|s| s.to_string()).collect(),
        universe,
        percent: percent(good.len(), universe),
        groups,
    }
}

#[cfg(test)]
mod tests {
    use super::share_report;
    use crate::dataset::SubjectManifest;
    use crate::partition::tests::subjects;
    use crate::partition::ContrastPartitions;
    use crate::select::{CandidateSet, Metric};
    use crate::Stat;

    #[test]
    fn test_share_report() {
        let manifest = SubjectManifest::new(subjects());
        let partitions = ContrastPartitions::build(&manifest, "t2");
        let stat = Stat { mean: 1.0, std: 0.0 };
        let candidates = CandidateSet {
            metric: Metric::Mse,
            candidates: [("s1".to_owned(), stat), ("s3__s4".to_owned(), stat)]
                .into_iter()
                .collect(),
        };

        let r = share_report(&candidates, &partitions);
        assert_eq!(r.good_trainers, ["s1", "s3", "s4"]);
        assert_eq!(r.universe, 6);
        assert_eq!(r.percent, 50.0);

        let ms = r.groups.iter().find(|g| g.group == "MS").unwrap();
        assert_eq!((ms.good, ms.total, ms.percent), (2, 2, 100.0));
        let hc = r.groups.iter().find(|g| g.group == "HC").unwrap();
        assert_eq!((hc.good, hc.total, hc.percent), (1, 2, 50.0));
        let iso = r.groups.iter().find(|g| g.group == "iso").unwrap();
        // s1, s3 为 iso.
        assert_eq!((iso.good, iso.total), (2, 2));
    }
}
