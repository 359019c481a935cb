//! 体素坐标到物理坐标 (毫米) 的仿射变换.
//!
//! 体素坐标按 nifti 惯例记为 `(i, j, k)`, 分别对应本库 `(z, h, w)` 索引中的
//! `w`, `h`, `z`. 也就是说 `i` 是自然图像的水平方向, `k` 是相邻切片方向.

use crate::Idx3d;
use nifti::NiftiHeader;

/// 3x4 仿射矩阵 (省略了恒为 `[0, 0, 0, 1]` 的最后一行).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Affine {
    rows: [[f64; 4]; 3],
}

impl Affine {
    /// 直接由矩阵的前三行构造.
    #[inline]
    pub const fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        Self { rows }
    }

    /// 单位变换 (体素即 1mm, 原点重合).
    #[inline]
    pub const fn identity() -> Self {
        Self::scaling([1.0, 1.0, 1.0])
    }

    /// 仅缩放的变换. `[si, sj, sk]` 为三个体素轴的分辨率 (单位: 毫米).
    #[inline]
    pub const fn scaling([si, sj, sk]: [f64; 3]) -> Self {
        Self {
            rows: [
                [si, 0.0, 0.0, 0.0],
                [0.0, sj, 0.0, 0.0],
                [0.0, 0.0, sk, 0.0],
            ],
        }
    }

    /// 返回平移了 `[ox, oy, oz]` (单位: 毫米) 的新变换.
    #[inline]
    pub fn translated(mut self, [ox, oy, oz]: [f64; 3]) -> Self {
        self.rows[0][3] += ox;
        self.rows[1][3] += oy;
        self.rows[2][3] += oz;
        self
    }

    /// 获取矩阵的前三行.
    #[inline]
    pub fn rows(&self) -> &[[f64; 4]; 3] {
        &self.rows
    }

    /// 从 nifti header 获取仿射变换.
    ///
    /// 优先级: `sform_code > 0` 时使用 `srow_{x,y,z}`; 否则 `qform_code > 0`
    /// 时使用四元数 + `pixdim` + 偏移量; 否则仅按 `pixdim` 缩放.
    pub fn from_header(h: &NiftiHeader) -> Self {
        if h.sform_code > 0 {
            let row = |r: &[f32; 4]| r.map(|v| v as f64);
            Self::from_rows([row(&h.srow_x), row(&h.srow_y), row(&h.srow_z)])
        } else if h.qform_code > 0 {
            Self::from_qform(h)
        } else {
            let [_, i, j, k, ..] = h.pixdim;
            Self::scaling([i as f64, j as f64, k as f64])
        }
    }

    /// 四元数形式 (nifti "method 2").
    fn from_qform(h: &NiftiHeader) -> Self {
        let (b, c, d) = (h.quatern_b as f64, h.quatern_c as f64, h.quatern_d as f64);
        // 数值误差可能使 1 - (b^2 + c^2 + d^2) 略小于 0.
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();

        let r = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - c * c - b * b,
            ],
        ];

        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let scale = [
            h.pixdim[1] as f64,
            h.pixdim[2] as f64,
            h.pixdim[3] as f64 * qfac,
        ];
        let offset = [
            h.quatern_x as f64,
            h.quatern_y as f64,
            h.quatern_z as f64,
        ];

        let mut rows = [[0.0; 4]; 3];
        for (row, (r_row, o)) in rows.iter_mut().zip(r.iter().zip(offset)) {
            for col in 0..3 {
                row[col] = r_row[col] * scale[col];
            }
            row[3] = o;
        }
        Self { rows }
    }

    /// 将体素坐标 `(i, j, k)` 变换为物理坐标 `[x, y, z]`.
    #[inline]
    pub fn apply(&self, (i, j, k): (f64, f64, f64)) -> [f64; 3] {
        self.rows.map(|r| r[0] * i + r[1] * j + r[2] * k + r[3])
    }

    /// 将本库的 `(z, h, w)` 索引变换为物理坐标 `[x, y, z]`.
    #[inline]
    pub fn voxel_to_phys(&self, (z, h, w): Idx3d) -> [f64; 3] {
        self.apply((w as f64, h as f64, z as f64))
    }

    /// 三个体素轴方向上的步长 (单位: 毫米), 即矩阵前三列的模长.
    pub fn voxel_sizes(&self) -> [f64; 3] {
        let mut ans = [0.0; 3];
        for (col, v) in ans.iter_mut().enumerate() {
            *v = self.rows.iter().map(|r| r[col].powi(2)).sum::<f64>().sqrt();
        }
        ans
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}
