use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::{EvalResult, Idx2d, Idx3d};

mod affine;
mod slice;

pub use affine::Affine;
pub use slice::VolumeSlice;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// nii 格式 3D 体数据, 包括 header 和体素值. 体素值统一以 `f32` 保存.
///
/// 预测中心线, 参考中心线, 参考分割都使用该结构. 体素值大于 0 视为前景.
#[derive(Debug, Clone)]
pub struct NiiVolume {
    header: BoxedHeader,
    data: Array3<f32>,
}

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率 (单位: 毫米), 按 nifti 体素轴顺序 `[i, j, k]` 排列,
    /// 即 `[宽, 高, 相邻切片方向]`.
    ///
    /// 该顺序与分辨率分组的 `(rx, ry, rz)` 一致.
    #[inline]
    fn resolution(&self) -> [f64; 3] {
        let [_, i, j, k, ..] = self.header().pixdim;
        [i as f64, j as f64, k as f64]
    }

    /// 体素到物理空间的仿射变换.
    #[inline]
    fn affine(&self) -> Affine {
        Affine::from_header(self.header())
    }
}

impl NiftiHeaderAttr for NiiVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for NiiVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl NiiVolume {
    /// 打开 nii (或 nii.gz) 格式的 3D 体数据. `path` 为文件的本地路径.
    pub fn open<P: AsRef<Path>>(path: P) -> EvalResult<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        let data =
            Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())?;

        Ok(Self { header, data })
    }

    /// 根据裸体素数据和仿射变换直接创建实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储.
    /// 2. `affine` 会写入 header 的 sform 部分, `pixdim` 取其各列模长.
    ///
    /// # 注意
    ///
    /// 该方法生成的 header 只保证本库用到的字段有意义, 因此你应仅将其用于实验或测试.
    pub fn fake(data: Array3<f32>, affine: Affine) -> Self {
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        let (z, h, w) = data.dim();
        let mut header = Box::<NiftiHeader>::default();
        header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
        let [si, sj, sk] = affine.voxel_sizes();
        header.pixdim = [1.0, si as f32, sj as f32, sk as f32, 1.0, 1.0, 1.0, 1.0];
        header.qform_code = 0;
        header.sform_code = 1;
        let [rx, ry, rz] = affine.rows().map(|r| r.map(|v| v as f32));
        (header.srow_x, header.srow_y, header.srow_z) = (rx, ry, rz);
        header.intent_name[..4].copy_from_slice(b"fake");

        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获取 z 空间的第 `z_index` 层切片视图.
    ///
    /// 当 `z_index` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z_index: usize) -> VolumeSlice<'_> {
        VolumeSlice::new(self.data.index_axis(Axis(0), z_index))
    }

    /// 获取能按升序迭代水平切片的迭代器.
    #[inline]
    pub fn slice_iter(&self) -> impl ExactSizeIterator<Item = VolumeSlice<'_>> {
        self.data.axis_iter(Axis(0)).map(VolumeSlice::new)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 含有前景体素的切片个数.
    pub fn foreground_slices(&self) -> usize {
        self.slice_iter().filter(|s| s.has_foreground()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::{Affine, NiftiHeaderAttr, NiiVolume};
    use ndarray::Array3;

    #[test]
    fn test_fake_layout_and_header() {
        // [w, h, z] = [4, 3, 2]
        let mut raw = Array3::<f32>::zeros((4, 3, 2));
        raw[[3, 1, 0]] = 1.0;
        let v = NiiVolume::fake(raw, Affine::scaling([0.5, 0.5, 2.0]));

        assert!(v.is_faked());
        assert_eq!(v.shape(), (2, 3, 4));
        assert_eq!(v.slice_shape(), (3, 4));
        assert_eq!(v.len_z(), 2);
        assert_eq!(v[(0, 1, 3)], 1.0);
        assert!(v.check(&(1, 2, 3)));
        assert!(!v.check(&(2, 0, 0)));
        assert_eq!(v.resolution(), [0.5, 0.5, 2.0]);
        assert_eq!(v.affine(), Affine::scaling([0.5, 0.5, 2.0]));
        assert_eq!(v.foreground_slices(), 1);
        assert_eq!(v.slice_at(0).first_foreground(), Some((1, 3)));
    }
}
