//! 运行时错误.

use crate::SubjectId;
use thiserror::Error;

/// 评估, 聚合, 分组与筛选过程中的运行时错误.
///
/// 注意 "参考中心线没有任何前景切片" 不是错误, 它会得到一个全空的
/// [`MetricResult`](crate::metric::MetricResult).
#[derive(Error, Debug)]
pub enum EvalError {
    /// 参考中心线在第 `z` 层有前景点, 但预测结果在该层没有.
    #[error("预测中心线在第 {z} 层切片缺失前景点")]
    PredictedPointMissing {
        /// 切片索引.
        z: usize,
    },

    /// 请求聚合结果时, 缓存中缺少部分单受试者结果.
    #[error("训练配置 `{configuration}` 缺少 {} 个测试结果: {missing:?}", .missing.len())]
    IncompleteAggregation {
        /// 训练配置标识符.
        configuration: String,
        /// 缺失的测试受试者.
        missing: Vec<SubjectId>,
    },

    /// 训练配置引用的受试者不在某个分组索引中.
    #[error("受试者 `{subject}` 不在 `{axis}` 分组索引中")]
    PartitionInconsistency {
        /// 受试者标识符.
        subject: SubjectId,
        /// 分组轴名称.
        axis: &'static str,
    },

    /// 缓存键的某个分量不能安全地作为路径分量.
    #[error("非法的缓存键分量 `{0}`")]
    InvalidKey(String),

    /// 未知的指标名称.
    #[error("未知指标 `{0}`, 可选值为 mse, maxmove, zcoverage")]
    UnknownMetric(String),

    /// 参与同一次评估的体数据形状不一致. 参数依次为预测, 参考中心线, 参考分割的 `(z, h, w)`.
    #[error("体数据形状不一致: {0:?}, {1:?}, {2:?}")]
    ShapeMismatch(crate::Idx3d, crate::Idx3d, crate::Idx3d),

    /// 体素个数与 header 声明的形状不符.
    #[error("体数据形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// 工作线程池创建失败.
    #[error("线程池创建失败: {0}")]
    WorkerPool(String),

    /// 读取 nifti 文件错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 底层 I/O 错误.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 缓存记录编解码错误.
    #[error("缓存记录编解码错误: {0}")]
    Codec(#[from] bincode::Error),

    /// 受试者清单解析错误.
    #[error("受试者清单解析错误: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// 评估运行时结果.
pub type EvalResult<T> = Result<T, EvalError>;
