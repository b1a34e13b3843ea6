//! `(z, x)` 切片矩阵及其集合.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::ops::Range;

use itertools::iproduct;
use ndarray::Array2;

use crate::Idx2d;

/// 单个 `(z, x)` 坐标上的时间序列矩阵, 形状为 `(Y, T)`.
///
/// 第 `t` 列是第 `t` 个时间点在 `(z, x)` 处沿 y 方向的体素值.
pub type SliceMatrix = Array2<f64>;

/// 切片键. 按 z 优先的字典序排序.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SliceKey {
    /// 水平切片索引.
    pub z: usize,

    /// 切片内的行索引.
    pub x: usize,
}

impl SliceKey {
    /// 构造切片键.
    #[inline]
    pub const fn new(z: usize, x: usize) -> Self {
        Self { z, x }
    }
}

impl From<Idx2d> for SliceKey {
    #[inline]
    fn from((z, x): Idx2d) -> Self {
        Self::new(z, x)
    }
}

impl From<SliceKey> for Idx2d {
    #[inline]
    fn from(key: SliceKey) -> Self {
        (key.z, key.x)
    }
}

impl fmt::Display for SliceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}_x{}", self.z, self.x)
    }
}

/// 按 z 优先序迭代 `z_range × [0, x_dim)` 内的所有切片键.
pub fn key_space(z_range: Range<usize>, x_dim: usize) -> impl Iterator<Item = SliceKey> {
    iproduct!(z_range, 0..x_dim).map(SliceKey::from)
}

/// 以 `(z, x)` 为键的切片矩阵集合.
///
/// 一次分解会产生两个平行的集合 (低秩与稀疏), 它们的键空间完全一致.
/// 集合由产生它的那次运行独占.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixCollection {
    data: BTreeMap<SliceKey, SliceMatrix>,
}

impl MatrixCollection {
    /// 创建空集合.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入 (或替换) `key` 对应的矩阵, 返回旧值.
    #[inline]
    pub fn insert(&mut self, key: SliceKey, matrix: SliceMatrix) -> Option<SliceMatrix> {
        self.data.insert(key, matrix)
    }

    /// 移除 `key` 对应的矩阵.
    #[inline]
    pub fn remove(&mut self, key: &SliceKey) -> Option<SliceMatrix> {
        self.data.remove(key)
    }

    /// 获取 `key` 对应的矩阵.
    #[inline]
    pub fn get(&self, key: &SliceKey) -> Option<&SliceMatrix> {
        self.data.get(key)
    }

    /// 获取 `key` 对应的可变矩阵.
    #[inline]
    pub fn get_mut(&mut self, key: &SliceKey) -> Option<&mut SliceMatrix> {
        self.data.get_mut(key)
    }

    /// 集合是否包含 `key`.
    #[inline]
    pub fn contains_key(&self, key: &SliceKey) -> bool {
        self.data.contains_key(key)
    }

    /// 矩阵个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 集合是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 按 z 优先序迭代所有键.
    #[inline]
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &SliceKey> {
        self.data.keys()
    }

    /// 按 z 优先序迭代所有 (键, 矩阵).
    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, SliceKey, SliceMatrix> {
        self.data.iter()
    }

    /// 两个集合的键空间是否完全一致.
    pub fn same_keys(&self, other: &Self) -> bool {
        self.len() == other.len() && Iterator::eq(self.keys(), other.keys())
    }
}

impl FromIterator<(SliceKey, SliceMatrix)> for MatrixCollection {
    fn from_iter<I: IntoIterator<Item = (SliceKey, SliceMatrix)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl Extend<(SliceKey, SliceMatrix)> for MatrixCollection {
    fn extend<I: IntoIterator<Item = (SliceKey, SliceMatrix)>>(&mut self, iter: I) {
        self.data.extend(iter);
    }
}

impl IntoIterator for MatrixCollection {
    type Item = (SliceKey, SliceMatrix);
    type IntoIter = btree_map::IntoIter<SliceKey, SliceMatrix>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a> IntoIterator for &'a MatrixCollection {
    type Item = (&'a SliceKey, &'a SliceMatrix);
    type IntoIter = btree_map::Iter<'a, SliceKey, SliceMatrix>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_key_order_is_z_major() {
        let mut keys = vec![
            SliceKey::new(1, 0),
            SliceKey::new(0, 2),
            SliceKey::new(0, 1),
            SliceKey::new(1, 1),
        ];
        keys.sort();
        let keys: Vec<Idx2d> = keys.into_iter().map(Idx2d::from).collect();
        assert_eq!(keys, [(0, 1), (0, 2), (1, 0), (1, 1)]);
    }

    #[test]
    fn test_key_space() {
        let keys: Vec<_> = key_space(2..4, 2).collect();
        assert_eq!(
            keys,
            [
                SliceKey::new(2, 0),
                SliceKey::new(2, 1),
                SliceKey::new(3, 0),
                SliceKey::new(3, 1)
            ]
        );
        assert_eq!(key_space(0..3, 0).count(), 0);
    }

    #[test]
    fn test_collection_basic() {
        let mut c = MatrixCollection::new();
        assert!(c.is_empty());
        c.insert(SliceKey::new(0, 1), array![[1.0, 2.0]]);
        c.insert(SliceKey::new(0, 0), array![[3.0, 4.0]]);
        assert_eq!(c.len(), 2);
        assert!(c.contains_key(&SliceKey::new(0, 0)));
        assert_eq!(c.keys().next(), Some(&SliceKey::new(0, 0)));

        let d: MatrixCollection = c.iter().map(|(k, m)| (*k, m * 2.0)).collect();
        assert!(c.same_keys(&d));
        assert_eq!(d.get(&SliceKey::new(0, 1)), Some(&array![[2.0, 4.0]]));

        c.remove(&SliceKey::new(0, 1));
        assert!(!c.same_keys(&d));
    }

    #[test]
    fn test_display() {
        assert_eq!(SliceKey::new(3, 14).to_string(), "z3_x14");
    }
}
