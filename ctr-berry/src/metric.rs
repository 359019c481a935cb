//! 单受试者几何精度指标.
//!
//! 对参考中心线有前景点的每一层切片, 比较预测点和参考点在物理空间中的平面距离,
//! 并检查预测点是否落在参考分割内:
//!
//! - `mse = sqrt(mean(d^2))` (单位: 毫米, 沿用原实验的命名, 实为均方根距离);
//! - `maxmove = sqrt(max(d^2))` (单位: 毫米);
//! - `zcoverage = 100 * 被覆盖层数 / 参与比较的层数` (单位: 百分比).

use crate::{EvalError, EvalResult, Idx2d, NiftiHeaderAttr, NiiVolume};
use serde::{Deserialize, Serialize};

/// 单个 (训练配置, 测试受试者) 的评估结果.
///
/// 三个字段同时为 `None` 当且仅当参考中心线没有任何前景切片.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    /// 均方根平面距离 (毫米), `>= 0`.
    pub mse: Option<f64>,

    /// 最大平面距离 (毫米), `>= mse`.
    pub maxmove: Option<f64>,

    /// 预测点落在参考分割内的切片百分比, 位于 `[0, 100]`.
    pub zcoverage: Option<f64>,
}

impl MetricResult {
    /// 参考数据缺失时的结果.
    pub const UNDEFINED: Self = Self {
        mse: None,
        maxmove: None,
        zcoverage: None,
    };

    /// 是否是参考数据缺失时的结果.
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.mse.is_none() && self.maxmove.is_none() && self.zcoverage.is_none()
    }

    /// 从逐层比较结果汇总. `matches` 为空时返回 [`Self::UNDEFINED`].
    pub fn from_matches(matches: &[SliceMatch]) -> Self {
        if matches.is_empty() {
            return Self::UNDEFINED;
        }
        let n = matches.len() as f64;
        let sum: f64 = matches.iter().map(|m| m.squared_distance).sum();
        let max = matches
            .iter()
            .map(|m| m.squared_distance)
            .fold(0.0f64, f64::max);
        let covered = matches.iter().filter(|m| m.covered).count() as f64;

        Self {
            mse: Some((sum / n).sqrt()),
            maxmove: Some(max.sqrt()),
            zcoverage: Some(covered * 100.0 / n),
        }
    }
}

/// 单层切片上预测点与参考点的比较结果.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SliceMatch {
    /// 切片索引.
    pub z: usize,

    /// 参考点 `(h, w)`.
    pub gold: Idx2d,

    /// 预测点 `(h, w)`.
    pub predicted: Idx2d,

    /// 物理空间中的平面距离平方 (单位: 平方毫米), 忽略层间方向.
    pub squared_distance: f64,

    /// 预测点是否落在参考分割内.
    pub covered: bool,
}

/// 逐层比较预测中心线 `pred` 与参考中心线 `gold`, 以参考分割 `seg` 判定覆盖.
///
/// 仅比较参考中心线有前景点的切片, 结果按 `z` 升序排列.
///
/// # 错误
///
/// 1. 三者形状不一致时返回 [`EvalError::ShapeMismatch`];
/// 2. 参考中心线某层有前景点而预测结果没有时返回
///   [`EvalError::PredictedPointMissing`]. 该层不会被跳过, 也不会按零距离处理.
pub fn compare_slices(
    pred: &NiiVolume,
    gold: &NiiVolume,
    seg: &NiiVolume,
) -> EvalResult<Vec<SliceMatch>> {
    if pred.shape() != gold.shape() || gold.shape() != seg.shape() {
        return Err(EvalError::ShapeMismatch(
            pred.shape(),
            gold.shape(),
            seg.shape(),
        ));
    }

    // 两者可以有不同的仿射变换.
    let pred_affine = pred.affine();
    let gold_affine = gold.affine();

    let mut ans = Vec::new();
    for (z, gold_slice) in gold.slice_iter().enumerate() {
        let Some(g) = gold_slice.first_foreground() else {
            continue;
        };
        let p = pred
            .slice_at(z)
            .first_foreground()
            .ok_or(EvalError::PredictedPointMissing { z })?;

        let covered = seg.slice_at(z).is_foreground_at(p);

        let [gx, gy, _] = gold_affine.voxel_to_phys((z, g.0, g.1));
        let [px, py, _] = pred_affine.voxel_to_phys((z, p.0, p.1));

        ans.push(SliceMatch {
            z,
            gold: g,
            predicted: p,
            squared_distance: (gx - px).powi(2) + (gy - py).powi(2),
            covered,
        });
    }
    Ok(ans)
}

/// 计算单受试者指标. 见 [`compare_slices`].
///
/// 该函数是纯计算, 不会修改任何输入.
#[inline]
pub fn compute(pred: &NiiVolume, gold: &NiiVolume, seg: &NiiVolume) -> EvalResult<MetricResult> {
    compare_slices(pred, gold, seg).map(|m| MetricResult::from_matches(&m))
}
