//! 体数据的水平切片视图.

use crate::consts::is_foreground;
use crate::Idx2d;
use ndarray::ArrayView2;
use std::ops::Index;

/// 不可变水平切片, 索引模式为 `(h, w)`.
#[derive(Debug, Clone)]
pub struct VolumeSlice<'a> {
    data: ArrayView2<'a, f32>,
}

impl<'a> VolumeSlice<'a> {
    /// 初始化.
    #[inline]
    pub fn new(data: ArrayView2<'a, f32>) -> Self {
        Self { data }
    }

    /// 切片形状 `(h, w)`.
    #[inline]
    pub fn shape(&self) -> Idx2d {
        self.data.dim()
    }

    /// 越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx2d) -> Option<&f32> {
        self.data.get(pos)
    }

    /// 切片中是否存在前景体素.
    #[inline]
    pub fn has_foreground(&self) -> bool {
        self.data.iter().any(|v| is_foreground(*v))
    }

    /// 前景体素个数.
    #[inline]
    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|v| is_foreground(**v)).count()
    }

    /// `pos` 处是否是前景. 越界视为背景.
    #[inline]
    pub fn is_foreground_at(&self, pos: Idx2d) -> bool {
        self.get(pos).is_some_and(|v| is_foreground(*v))
    }

    /// 按 "先 `w` (体素 `i` 轴) 后 `h` (体素 `j` 轴)" 的顺序找到第一个前景体素,
    /// 返回其 `(h, w)` 索引. 不存在前景时返回 `None`.
    ///
    /// 中心线每层至多一个点, 因此 "第一个" 即是 "唯一一个".
    /// 若某层意外存在多个点, 该顺序保证结果稳定.
    pub fn first_foreground(&self) -> Option<Idx2d> {
        // `t()` 之后逻辑顺序为 (w, h), 外层循环在 w 上.
        self.data
            .t()
            .indexed_iter()
            .find_map(|((w, h), v)| is_foreground(*v).then_some((h, w)))
    }
}

impl Index<Idx2d> for VolumeSlice<'_> {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx2d) -> &Self::Output {
        &self.data[index]
    }
}

#[cfg(test)]
mod tests {
    use super::VolumeSlice;
    use ndarray::Array2;

    #[test]
    fn test_first_foreground_order() {
        // (h, w)
        let mut a = Array2::<f32>::zeros((4, 5));
        a[(3, 1)] = 1.0;
        a[(0, 2)] = 1.0;
        a[(1, 1)] = 2.0;
        let s = VolumeSlice::new(a.view());

        // w 最小者优先, 同 w 时 h 最小者优先.
        assert_eq!(s.first_foreground(), Some((1, 1)));
        assert_eq!(s.foreground_count(), 3);
        assert!(s.has_foreground());
    }

    #[test]
    fn test_empty_and_bounds() {
        let a = Array2::<f32>::zeros((3, 3));
        let s = VolumeSlice::new(a.view());
        assert_eq!(s.first_foreground(), None);
        assert!(!s.has_foreground());
        assert!(!s.is_foreground_at((10, 10)));
    }

    #[test]
    fn test_negative_is_background() {
        let mut a = Array2::<f32>::zeros((2, 2));
        a[(0, 0)] = -1.0;
        a[(1, 1)] = 0.5;
        let s = VolumeSlice::new(a.view());
        assert_eq!(s.first_foreground(), Some((1, 1)));
        assert!(!s.is_foreground_at((0, 0)));
    }
}
