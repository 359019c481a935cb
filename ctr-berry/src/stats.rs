use serde::{Deserialize, Serialize};

/// 一组数值的均值和 (总体) 标准差.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    /// 均值.
    pub mean: f64,

    /// 总体标准差 (除以 `n` 而不是 `n - 1`).
    pub std: f64,
}

impl Stat {
    /// 计算 `values` 的均值和总体标准差. 若 `values` 为空, 返回 `None`.
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Some(Self {
            mean,
            std: var.sqrt(),
        })
    }
}

/// 四舍五入到两位小数.
#[inline]
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::{round2, Stat};

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_stat_population_std() {
        let s = Stat::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(f64_eq(s.mean, 5.0));
        assert!(f64_eq(s.std, 2.0));

        let s = Stat::of(&[3.0]).unwrap();
        assert!(f64_eq(s.std, 0.0));

        assert!(Stat::of(&[]).is_none());
    }

    #[test]
    fn test_round2() {
        assert!(f64_eq(round2(4.8), 4.8));
        assert!(f64_eq(round2(0.4472135), 0.45));
        assert!(f64_eq(round2(33.333333), 33.33));
    }
}
