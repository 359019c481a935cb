//! 通用常量.

/// 筛选策略常量. 单位均标注在名称中.
pub mod policy {
    /// 平均 mse 必须 **严格小于** 该值 (毫米), 训练配置才会入选.
    pub const MSE_THRESHOLD_MM: f64 = 5.0;

    /// 平均 maxmove 必须 **严格小于** 该值 (毫米), 训练配置才会入选.
    pub const MAXMOVE_THRESHOLD_MM: f64 = 5.0;

    /// 平均 zcoverage 必须 **严格大于** 该值 (百分比), 训练配置才会入选.
    pub const ZCOVERAGE_THRESHOLD_PCT: f64 = 90.0;

    /// 单个测试受试者的 maxmove 不小于该值 (毫米) 时视为预测失败.
    pub const FAIL_MAXMOVE_MM: f64 = 10.0;

    /// 报告离群值时, 距离类指标的上限 (毫米, 失败率则为百分比).
    pub const OUTLIER_DISTANCE_LIMIT: f64 = 10.0;

    /// 报告离群值时, zcoverage 的下限 (百分比).
    pub const OUTLIER_ZCOVERAGE_LIMIT: f64 = 90.0;
}

/// 病理标签为空的受试者会被并入该组 (健康对照).
pub const HEALTHY_CONTROL: &str = "HC";

/// 训练配置标识符中, 各训练受试者之间的分隔符.
pub const CONFIGURATION_SEP: &str = "__";

/// 体素值是否是前景?
#[inline]
pub fn is_foreground(voxel: f32) -> bool {
    voxel > 0.0
}
