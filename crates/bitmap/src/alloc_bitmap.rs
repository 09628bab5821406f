use alloc::vec::Vec;
use core::mem::size_of;

use crate::{bitmap_core::BitMapCore, traits::BitMapOps};

/// 动态分配的位图
///
/// 位图的大小在创建时确定，位于堆上
#[derive(Debug, Clone)]
pub struct AllocBitmap {
    elements: usize,
    data: Vec<usize>,
    core: BitMapCore<usize>,
}

impl AllocBitmap {
    pub fn new(elements: usize) -> Self {
        let data = vec![0usize; (elements + usize::BITS as usize - 1) / (usize::BITS as usize)];
        Self {
            elements,
            data,
            core: BitMapCore::new(),
        }
    }
}

impl PartialEq for AllocBitmap {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements && self.data == other.data
    }
}

impl Eq for AllocBitmap {}

impl BitMapOps<usize> for AllocBitmap {
    #[inline]
    fn get(&self, index: usize) -> Option<bool> {
        return self.core.get(self.elements, &self.data, index);
    }

    #[inline]
    fn set(&mut self, index: usize, value: bool) -> Option<bool> {
        return self.core.set(self.elements, &mut self.data, index, value);
    }

    #[inline]
    fn len(&self) -> usize {
        self.elements
    }

    #[inline]
    fn size(&self) -> usize {
        self.data.len() * size_of::<usize>()
    }

    #[inline]
    fn first_index(&self) -> Option<usize> {
        self.core.first_index(&self.data)
    }

    #[inline]
    fn first_false_index(&self) -> Option<usize> {
        self.core.first_false_index(self.elements, &self.data)
    }

    #[inline]
    fn last_index(&self) -> Option<usize> {
        self.core.last_index(self.elements, &self.data)
    }

    #[inline]
    fn next_index(&self, index: usize) -> Option<usize> {
        self.core.next_index(self.elements, &self.data, index)
    }

    #[inline]
    fn next_false_index(&self, index: usize) -> Option<usize> {
        self.core.next_false_index(self.elements, &self.data, index)
    }

    #[inline]
    fn prev_index(&self, index: usize) -> Option<usize> {
        self.core.prev_index(self.elements, &self.data, index)
    }

    #[inline]
    fn invert(&mut self) {
        self.core.invert(self.elements, &mut self.data);
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.core.is_full(self.elements, &self.data)
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.core.is_empty(&self.data)
    }

    fn set_all(&mut self, value: bool) {
        self.core.set_all(self.elements, &mut self.data, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get() {
        let mut bmp = AllocBitmap::new(100);
        assert_eq!(bmp.set(3, true), Some(false));
        assert_eq!(bmp.get(3), Some(true));
        assert_eq!(bmp.get(4), Some(false));
        assert_eq!(bmp.get(100), None);
        assert_eq!(bmp.first_index(), Some(3));
    }

    #[test]
    fn test_set_all() {
        let mut bmp = AllocBitmap::new(70);
        bmp.set_all(true);
        assert!(bmp.is_full());
        assert_eq!(bmp.get(69), Some(true));
        bmp.set_all(false);
        assert!(bmp.is_empty());
    }

    #[test]
    fn test_next_index() {
        let mut bmp = AllocBitmap::new(130);
        bmp.set(10, true);
        bmp.set(127, true);
        bmp.set(128, true);
        assert_eq!(bmp.next_index(10), Some(127));
        assert_eq!(bmp.next_index(127), Some(128));
        assert_eq!(bmp.next_index(128), None);
    }
}
