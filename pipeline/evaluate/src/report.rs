//! 实验结果.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

use ctr_berry::dataset::TrainerConfiguration;
use ctr_berry::eval::PairOutcome;
use ctr_berry::generalize::GeneralizationMatrix;
use ctr_berry::partition::PartitionAxis;
use ctr_berry::select::{Metric, Selection, ShareReport};
use ctr_berry::store::{AggregateResult, Experiment};
use ctr_berry::summary::{self, AggregateColumn, Summary};

const S4: &str = "    ";

/// 单个组内, 单个指标的筛选结果.
#[derive(Debug)]
pub struct GroupSelection {
    /// 分组轴.
    pub axis: PartitionAxis,
    /// 组名.
    pub group: String,
    /// 筛选结果.
    pub selection: Selection,
}

/// 一次批量评估的最终结果.
#[derive(Debug)]
pub struct Report {
    pub experiment: Experiment,
    pub metric: Metric,
    pub outcomes: Vec<PairOutcome>,
    pub incomplete: Vec<(TrainerConfiguration, String)>,
    pub aggregates: BTreeMap<TrainerConfiguration, AggregateResult>,
    pub selections: Vec<GroupSelection>,
    pub overall: Selection,
    pub share: ShareReport,
    pub matrices: Vec<GeneralizationMatrix>,
    pub outliers: BTreeMap<AggregateColumn, BTreeSet<String>>,
}

#[inline]
fn f64_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) => format!("{f:.2}"),
        None => "/".to_string(),
    }
}

fn describe_pairs<W: Write>(r: &Report, w: &mut W) -> io::Result<()> {
    let failed: Vec<_> = r.outcomes.iter().filter(|o| !o.is_ok()).collect();
    writeln!(w, "Experiment `{}`:", r.experiment)?;
    writeln!(w, "{S4}Evaluated pairs: {}", r.outcomes.len())?;
    writeln!(w, "{S4}Failed pairs: {}", failed.len())?;
    for o in failed {
        if let Err(e) = &o.result {
            writeln!(w, "{S4}{S4}{} / {}: {e}", o.configuration, o.subject)?;
        }
    }
    writeln!(w, "{S4}Aggregated configurations: {}", r.aggregates.len())?;
    for (cfg, e) in &r.incomplete {
        writeln!(w, "{S4}{S4}skipped `{cfg}`: {e}")?;
    }
    Ok(())
}

fn describe_columns<W: Write>(r: &Report, w: &mut W) -> io::Result<()> {
    writeln!(w, "Column summary:")?;
    for column in AggregateColumn::ALL {
        match Summary::of_column(r.aggregates.values(), column) {
            Some(s) => writeln!(
                w,
                "{S4}{:<20} n={} mean={:.2} std={:.2} min={:.2} max={:.2}",
                column.name(),
                s.n,
                s.mean,
                s.std,
                s.min,
                s.max
            )?,
            None => writeln!(w, "{S4}{:<20} /", column.name())?,
        }
    }

    writeln!(w, "Outliers:")?;
    for (column, ids) in &r.outliers {
        writeln!(w, "{S4}{}: {}", column.name(), ids.len())?;
    }
    let persistent = summary::persistent_outliers(&r.outliers);
    write!(w, "{S4}Persistent: ")?;
    if persistent.is_empty() {
        writeln!(w, "/")?;
    } else {
        writeln!(w, "{}", persistent.into_iter().collect::<Vec<_>>().join(", "))?;
    }
    Ok(())
}

fn describe_selection<W: Write>(title: &str, s: &Selection, w: &mut W) -> io::Result<()> {
    let metric = s.candidates.metric;
    writeln!(
        w,
        "{title} [{metric}]: {} of {} accepted",
        s.candidates.len(),
        s.ranking.len()
    )?;
    for r in s.ranking.iter().filter(|r| r.accepted) {
        writeln!(
            w,
            "{S4}{:<32} {:.2} ± {:.2}",
            r.configuration, r.stat.mean, r.stat.std
        )?;
    }
    Ok(())
}

fn describe_share<W: Write>(s: &ShareReport, w: &mut W) -> io::Result<()> {
    writeln!(
        w,
        "Good trainers [{}]: {} ({:.2}% of {} subjects)",
        s.metric,
        s.good_trainers.len(),
        s.percent,
        s.universe
    )?;
    for g in &s.groups {
        writeln!(
            w,
            "{S4}{:.2}% of {} `{}` subjects (#={})",
            g.percent, g.axis, g.group, g.total
        )?;
    }
    Ok(())
}

fn describe_matrix<W: Write>(m: &GeneralizationMatrix, w: &mut W) -> io::Result<()> {
    writeln!(w, "Generalization [{} / {}] (row: train, col: test):", m.axis(), m.metric())?;
    write!(w, "{S4}{:>8}", "")?;
    for g in m.groups() {
        write!(w, "{g:>10}")?;
    }
    writeln!(w)?;
    for train in m.groups() {
        write!(w, "{S4}{train:>8}")?;
        for test in m.groups() {
            let v = f64_to_display(m.cell(train, test).map(|s| s.mean));
            write!(w, "{v:>10}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

impl Report {
    /// 将全部结果写进 `w` 中.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        describe_pairs(self, w)?;
        utils::sep_to(&mut *w)?;
        describe_columns(self, w)?;
        utils::sep_to(&mut *w)?;
        describe_selection("Overall", &self.overall, w)?;
        describe_share(&self.share, w)?;
        utils::sep_to(&mut *w)?;
        for g in self.selections.iter().filter(|g| g.selection.candidates.metric == self.metric) {
            let title = format!("{} `{}`", g.axis, g.group);
            describe_selection(&title, &g.selection, w)?;
        }
        utils::sep_to(&mut *w)?;
        for m in &self.matrices {
            describe_matrix(m, w)?;
        }
        Ok(())
    }

    /// 分析运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.describe_into(&mut lock)
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_matrix, describe_selection};
    use ctr_berry::dataset::TrainerConfiguration;
    use ctr_berry::generalize;
    use ctr_berry::metric::MetricResult;
    use ctr_berry::partition::{PartitionAxis, PartitionIndex};
    use ctr_berry::select::{self, Metric, ThresholdPolicy};
    use ctr_berry::store::{MemoryBackend, ResultStore};
    use ctr_berry::Stat;
    use std::collections::BTreeMap;

    #[test]
    fn test_describe_selection() {
        let stats: BTreeMap<String, Stat> = [("a", 1.0), ("b", 6.0)]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), Stat { mean: v, std: 0.5 }))
            .collect();
        let sel = select::select(&stats, Metric::Mse, &ThresholdPolicy::default());

        let mut buf = Vec::new();
        describe_selection("HC", &sel, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("HC [mse]: 1 of 2 accepted"));
        assert!(text.contains("1.00 ± 0.50"));
        assert!(!text.contains("6.00"));
    }

    #[test]
    fn test_describe_matrix() {
        let store = ResultStore::new(MemoryBackend::new());
        let a = TrainerConfiguration::new("t2", ["s1"]);
        let r = MetricResult {
            mse: Some(2.0),
            maxmove: Some(2.0),
            zcoverage: Some(100.0),
        };
        store.pair_with(&a, "s2", || Ok(r)).unwrap();
        let p = PartitionIndex::from_groups(
            PartitionAxis::Pathology,
            [("HC", vec!["s1", "s2"]), ("MS", vec!["s3"])],
        );
        let m = generalize::build_from_store(&store, &p, &[a], Metric::Mse).unwrap();

        let mut buf = Vec::new();
        describe_matrix(&m, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("pathology / mse"));
        assert!(text.contains("2.00"));
        assert!(text.contains('/'));
    }
}
