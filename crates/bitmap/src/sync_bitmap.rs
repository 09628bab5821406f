use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 原子位图
///
/// 每个字都是一个原子变量，所有位操作均为原子操作，可以被多个执行流
/// （以及通过共享内存观察位图的外部实体）并发访问，无需额外加锁。
///
/// 等价于内核位图操作的sync版本（sync_set_bit/sync_clear_bit等）。
pub struct SyncBitmap {
    elements: usize,
    data: Box<[AtomicUsize]>,
}

impl SyncBitmap {
    pub fn new(elements: usize) -> Self {
        let words = (elements + usize::BITS as usize - 1) / (usize::BITS as usize);
        let mut data = Vec::with_capacity(words);
        data.resize_with(words, || AtomicUsize::new(0));
        Self {
            elements,
            data: data.into_boxed_slice(),
        }
    }

    /// 获取位图的长度（以位为单位）
    #[inline]
    pub fn len(&self) -> usize {
        self.elements
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements == 0
    }

    /// 获取位图的字数
    #[inline]
    pub fn word_count(&self) -> usize {
        self.data.len()
    }

    /// 原子地将某一位置1，返回置位前的值
    pub fn test_and_set(&self, index: usize) -> Option<bool> {
        if index >= self.elements {
            return None;
        }
        let mask = 1usize << (index % usize::BITS as usize);
        let prev = self.data[index / usize::BITS as usize].fetch_or(mask, Ordering::SeqCst);
        return Some((prev & mask) != 0);
    }

    /// 原子地将某一位置1
    #[inline]
    pub fn set(&self, index: usize) {
        self.test_and_set(index);
    }

    /// 原子地将某一位清零，返回清零前的值
    pub fn test_and_clear(&self, index: usize) -> Option<bool> {
        if index >= self.elements {
            return None;
        }
        let mask = 1usize << (index % usize::BITS as usize);
        let prev = self.data[index / usize::BITS as usize].fetch_and(!mask, Ordering::SeqCst);
        return Some((prev & mask) != 0);
    }

    /// 原子地将某一位清零
    #[inline]
    pub fn clear(&self, index: usize) {
        self.test_and_clear(index);
    }

    /// 读取某一位的当前值
    pub fn test(&self, index: usize) -> Option<bool> {
        if index >= self.elements {
            return None;
        }
        let mask = 1usize << (index % usize::BITS as usize);
        let word = self.data[index / usize::BITS as usize].load(Ordering::SeqCst);
        return Some((word & mask) != 0);
    }

    /// 读取整个字
    #[inline]
    pub fn word(&self, word_index: usize) -> usize {
        self.data[word_index].load(Ordering::SeqCst)
    }

    /// 原子地交换整个字，返回旧值
    #[inline]
    pub fn swap_word(&self, word_index: usize, value: usize) -> usize {
        self.data[word_index].swap(value, Ordering::SeqCst)
    }

    /// 将所有位置1（包括最后一个字的越界部分，与共享页语义一致，
    /// 越界位不会被任何按位访问接口观察到）
    pub fn set_all(&self) {
        for word in self.data.iter() {
            word.store(usize::MAX, Ordering::SeqCst);
        }
    }

    /// 将所有位清零
    pub fn clear_all(&self) {
        for word in self.data.iter() {
            word.store(0, Ordering::SeqCst);
        }
    }

    /// 位图数据的起始地址（用于将该位图作为共享页注册给外部实体）
    #[inline]
    pub fn as_ptr(&self) -> *const usize {
        self.data.as_ptr() as *const usize
    }
}

impl core::fmt::Debug for SyncBitmap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncBitmap")
            .field("elements", &self.elements)
            .finish()
    }
}
