#![warn(missing_docs)] // <= 合适时移除它.
// #![warn(clippy::missing_docs_in_private_items)]  // <= too strict.

//! 核心库. 评估脊髓中心线预测算法在多个受试者、多个训练配置上的几何精度,
//! 并在不同亚群体 (病理分组, 采集分辨率分组) 上挑选泛化能力最好的训练配置.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 预测结果只接受 "每个 2D 切片至多一个前景点" 的格式.
//! 2. 数据相关的失败全部通过 [`EvalError`] 返回, 不会 panic.
//!
//! # 开发计划
//!
//! ### 单受试者几何指标 (mse / maxmove / zcoverage) ✅
//!
//! 实现位于 `ctr-berry/src/metric`.
//!
//! ### 幂等结果缓存, 支持断点续跑 ✅
//!
//! 每个 (训练配置, 测试受试者) 只计算并持久化一次. 后端可以是文件系统,
//! 也可以是内存 (测试用).
//!
//! 实现位于 `ctr-berry/src/store`.
//!
//! ### 受试者分组 ✅
//!
//! 1. 按病理标签分组, 空标签并入 "HC". ✅
//! 2. 按体素分辨率分为 iso / sag / ax. ✅
//!
//! 实现位于 `ctr-berry/src/partition`.
//!
//! ### 训练配置筛选 ✅
//!
//! 阈值策略为独立常量 (见 [`consts`]), 可以整体替换.
//!
//! 实现位于 `ctr-berry/src/select`.
//!
//! ### 跨分组泛化矩阵 ✅
//!
//! 实现位于 `ctr-berry/src/generalize`.
//!
//! ### 并行批量评估 ✅
//!
//! 借助 `rayon` 线程池 (`rayon` feature) 并行计算所有 (训练配置, 测试受试者) 对,
//! 仅通过幂等缓存协调.
//!
//! 实现位于 `ctr-berry/src/eval.rs`.
//!
//! ### 报告用统计 ✅
//!
//! 离群配置, 列汇总统计.
//!
//! 实现位于 `ctr-berry/src/summary.rs`.

/// 二维索引 `(h, w)`.
pub type Idx2d = (usize, usize);

/// 三维索引 `(z, h, w)`.
pub type Idx3d = (usize, usize, usize);

/// 受试者标识符.
pub type SubjectId = String;

mod error;

pub use error::{EvalError, EvalResult};

/// 3D nii 文件基础数据结构.
pub mod data;

pub use data::{Affine, NiftiHeaderAttr, NiiVolume};

pub mod consts;

pub mod dataset;

pub mod eval;

pub mod generalize;

pub mod metric;

pub mod partition;

pub mod prelude;

pub mod select;

pub mod store;

pub mod summary;

mod stats;

pub use stats::Stat;
