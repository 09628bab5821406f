use core::sync::atomic::{AtomicI32, Ordering};

use alloc::boxed::Box;
use alloc::vec::Vec;

use bitmap::SyncBitmap;

use crate::hypercall::GsiNumber;
use crate::irqcore::IrqNumber;
use crate::smp::ProcessorId;

use super::{EventChannelPort, NR_EVENT_CHANNELS};

const PAGE_SHIFT: u32 = 12;

/// 端口与IRQ之间的双向映射表
///
/// `evtchn_to_irq`是无锁读者的反向映射；每CPU的端口掩码把
/// 当前绑定的端口集合划分到各自的投递CPU上。
#[derive(Debug)]
pub struct PortTable {
    /// 端口→IRQ映射，-1表示未绑定
    evtchn_to_irq: Box<[AtomicI32]>,
    /// 每CPU一份的端口掩码：端口恰好在其投递CPU的掩码中置位
    cpu_evtchn_mask: Box<[SyncBitmap]>,
    /// 哪些GSI在EOI时需要通知hypervisor（hypervisor可读的共享页）
    pirq_needs_eoi: SyncBitmap,
}

impl PortTable {
    pub fn new(nr_cpus: usize, nr_pirqs: usize) -> Self {
        let mut evtchn_to_irq = Vec::with_capacity(NR_EVENT_CHANNELS);
        evtchn_to_irq.resize_with(NR_EVENT_CHANNELS, || AtomicI32::new(-1));

        let mut cpu_evtchn_mask = Vec::with_capacity(nr_cpus);
        cpu_evtchn_mask.resize_with(nr_cpus, || SyncBitmap::new(NR_EVENT_CHANNELS));

        let table = Self {
            evtchn_to_irq: evtchn_to_irq.into_boxed_slice(),
            cpu_evtchn_mask: cpu_evtchn_mask.into_boxed_slice(),
            pirq_needs_eoi: SyncBitmap::new(nr_pirqs),
        };
        table.init_cpu_bindings();
        return table;
    }

    /// 端口→IRQ的无锁查询
    pub fn lookup_irq(&self, evtchn: EventChannelPort) -> Option<IrqNumber> {
        let raw = self.evtchn_to_irq[evtchn.data() as usize].load(Ordering::Acquire);
        if raw < 0 {
            return None;
        }
        return Some(IrqNumber::new(raw as u32));
    }

    /// 发布端口→IRQ映射（在IrqInfo写入之后调用）
    pub(crate) fn set_irq_mapping(&self, evtchn: EventChannelPort, irq: IrqNumber) {
        self.evtchn_to_irq[evtchn.data() as usize].store(irq.data() as i32, Ordering::Release);
    }

    /// 撤销端口→IRQ映射（在IrqInfo释放之前调用）
    pub(crate) fn clear_irq_mapping(&self, evtchn: EventChannelPort) {
        self.evtchn_to_irq[evtchn.data() as usize].store(-1, Ordering::Release);
    }

    pub(crate) fn clear_all_mappings(&self) {
        for entry in self.evtchn_to_irq.iter() {
            entry.store(-1, Ordering::Release);
        }
    }

    /// 把端口从一个CPU的掩码移动到另一个CPU
    pub(crate) fn move_port_cpu(
        &self,
        evtchn: EventChannelPort,
        from: ProcessorId,
        to: ProcessorId,
    ) {
        self.cpu_evtchn_mask[from.data() as usize].clear(evtchn.data() as usize);
        self.cpu_evtchn_mask[to.data() as usize].set(evtchn.data() as usize);
    }

    /// 端口是否属于指定CPU
    pub fn port_on_cpu(&self, evtchn: EventChannelPort, cpu: ProcessorId) -> bool {
        self.cpu_evtchn_mask[cpu.data() as usize]
            .test(evtchn.data() as usize)
            .unwrap_or(false)
    }

    /// 读取某CPU端口掩码的一个字
    #[inline]
    pub fn cpu_mask_word(&self, cpu: ProcessorId, word_index: usize) -> usize {
        self.cpu_evtchn_mask[cpu.data() as usize].word(word_index)
    }

    /// 重置每CPU的端口归属：所有端口默认投递到CPU0
    pub(crate) fn init_cpu_bindings(&self) {
        for (cpu, mask) in self.cpu_evtchn_mask.iter().enumerate() {
            if cpu == 0 {
                mask.set_all();
            } else {
                mask.clear_all();
            }
        }
    }

    pub fn pirq_needs_eoi(&self, gsi: GsiNumber) -> bool {
        self.pirq_needs_eoi.test(gsi.data() as usize).unwrap_or(false)
    }

    pub(crate) fn set_pirq_needs_eoi(&self, gsi: GsiNumber, value: bool) {
        if value {
            self.pirq_needs_eoi.set(gsi.data() as usize);
        } else {
            self.pirq_needs_eoi.clear(gsi.data() as usize);
        }
    }

    /// 共享EOI位图页的页帧号，用于注册给hypervisor
    pub(crate) fn pirq_eoi_gmfn(&self) -> u64 {
        (self.pirq_needs_eoi.as_ptr() as u64) >> PAGE_SHIFT
    }
}
