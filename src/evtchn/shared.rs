use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitmap::SyncBitmap;

use crate::smp::ProcessorId;

use super::{EventChannelPort, NR_EVENT_CHANNELS};

/// 与hypervisor共享的每VCPU记录
#[derive(Debug)]
pub struct VcpuInfo {
    /// 该VCPU上有待处理的上行调用
    evtchn_upcall_pending: AtomicBool,
    /// 屏蔽该VCPU的上行调用投递
    evtchn_upcall_mask: AtomicBool,
    /// 两级位图的第一级：第w位表示pending[w]中存在置位的端口
    evtchn_pending_sel: AtomicUsize,
}

#[allow(dead_code)]
impl VcpuInfo {
    fn new() -> Self {
        Self {
            evtchn_upcall_pending: AtomicBool::new(false),
            evtchn_upcall_mask: AtomicBool::new(false),
            evtchn_pending_sel: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn upcall_pending(&self) -> bool {
        self.evtchn_upcall_pending.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_upcall_pending(&self, value: bool) {
        self.evtchn_upcall_pending.store(value, Ordering::SeqCst);
    }

    #[inline]
    pub fn upcall_mask(&self) -> bool {
        self.evtchn_upcall_mask.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn set_upcall_mask(&self, value: bool) {
        self.evtchn_upcall_mask.store(value, Ordering::SeqCst);
    }

    /// 原子地置位selector字中的某一位，返回置位前的值
    #[inline]
    pub fn test_and_set_pending_sel(&self, word_index: usize) -> bool {
        let mask = 1usize << word_index;
        let prev = self.evtchn_pending_sel.fetch_or(mask, Ordering::SeqCst);
        return (prev & mask) != 0;
    }

    /// 原子地取走整个selector字
    #[inline]
    pub fn xchg_pending_sel(&self) -> usize {
        self.evtchn_pending_sel.swap(0, Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn pending_sel(&self) -> usize {
        self.evtchn_pending_sel.load(Ordering::SeqCst)
    }
}

/// 与hypervisor共享的事件通道状态
///
/// `evtchn_pending`由hypervisor以及其他CPU并发置位，
/// 所有访问都必须使用原子位操作。
#[derive(Debug)]
pub struct SharedInfo {
    evtchn_pending: SyncBitmap,
    evtchn_mask: SyncBitmap,
    vcpu_info: Box<[VcpuInfo]>,
}

impl SharedInfo {
    pub fn new(nr_cpus: usize) -> Self {
        let mut vcpu_info = Vec::with_capacity(nr_cpus);
        vcpu_info.resize_with(nr_cpus, VcpuInfo::new);
        Self {
            evtchn_pending: SyncBitmap::new(NR_EVENT_CHANNELS),
            evtchn_mask: SyncBitmap::new(NR_EVENT_CHANNELS),
            vcpu_info: vcpu_info.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn vcpu(&self, cpu: ProcessorId) -> &VcpuInfo {
        &self.vcpu_info[cpu.data() as usize]
    }

    /// 屏蔽一个端口
    #[inline]
    pub fn mask_evtchn(&self, port: EventChannelPort) {
        self.evtchn_mask.set(port.data() as usize);
    }

    /// 屏蔽一个端口，返回屏蔽前的状态
    #[inline]
    pub fn test_and_set_mask(&self, port: EventChannelPort) -> bool {
        self.evtchn_mask
            .test_and_set(port.data() as usize)
            .unwrap_or(false)
    }

    /// 解除一个端口的屏蔽（仅本地位操作，边沿补偿由调用者负责）
    #[inline]
    pub fn clear_mask(&self, port: EventChannelPort) {
        self.evtchn_mask.clear(port.data() as usize);
    }

    #[inline]
    pub fn is_masked(&self, port: EventChannelPort) -> bool {
        self.evtchn_mask
            .test(port.data() as usize)
            .unwrap_or(false)
    }

    /// 屏蔽所有端口
    pub fn mask_all(&self) {
        self.evtchn_mask.set_all();
    }

    #[inline]
    pub fn set_evtchn(&self, port: EventChannelPort) {
        self.evtchn_pending.set(port.data() as usize);
    }

    #[inline]
    pub fn clear_evtchn(&self, port: EventChannelPort) {
        self.evtchn_pending.clear(port.data() as usize);
    }

    #[inline]
    pub fn test_evtchn(&self, port: EventChannelPort) -> bool {
        self.evtchn_pending
            .test(port.data() as usize)
            .unwrap_or(false)
    }

    /// 读取pending位图的一个字
    #[inline]
    pub fn pending_word(&self, word_index: usize) -> usize {
        self.evtchn_pending.word(word_index)
    }

    /// 读取mask位图的一个字
    #[inline]
    pub fn mask_word(&self, word_index: usize) -> usize {
        self.evtchn_mask.word(word_index)
    }
}
