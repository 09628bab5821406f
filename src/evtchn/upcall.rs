use core::sync::atomic::{AtomicUsize, Ordering};

use crate::smp::ProcessorId;

use super::manage::EvtchnManager;
use super::{EventChannelPort, EVTCHN_WORD_BITS, NR_EVENT_WORDS};

/// selector字中超过实际pending字数的高位不对应任何端口
const PENDING_SEL_MASK: usize = if NR_EVENT_WORDS >= usize::BITS as usize {
    usize::MAX
} else {
    (1usize << NR_EVENT_WORDS) - 1
};

/// 上行调用的每CPU状态
///
/// 游标记录上一次扫描停下的位置，让扫描从上次处理完的端口之后
/// 继续，而不是每次都从0号端口开始：在高负载下，自底向上的扫描
/// 会让低编号端口饿死高编号端口。
#[derive(Debug)]
pub struct UpcallState {
    /// 公平性游标：下一次扫描的起始字
    current_word_idx: AtomicUsize,
    /// 公平性游标：下一次扫描的起始位
    current_bit_idx: AtomicUsize,
    /// 重入折叠计数
    nesting_count: AtomicUsize,
}

impl UpcallState {
    pub(super) fn new() -> Self {
        Self {
            current_word_idx: AtomicUsize::new(0),
            current_bit_idx: AtomicUsize::new(0),
            nesting_count: AtomicUsize::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn cursor(&self) -> (usize, usize) {
        (
            self.current_word_idx.load(Ordering::SeqCst),
            self.current_bit_idx.load(Ordering::SeqCst),
        )
    }
}

/// 清除w中最低的i个位
#[inline(always)]
fn mask_lsbs(w: usize, i: usize) -> usize {
    w & (usize::MAX << i)
}

impl EvtchnManager {
    /// 事件上行调用入口
    ///
    /// 搜索当前CPU的pending事件位图，把每个事件映射为IRQ并送入
    /// 宿主的中断分发路径。调用时本地中断必须处于关闭状态。
    ///
    /// Xen使用两级位图加速搜索：第一级（selector）的每一位指示
    /// 第二级的对应字中存在pending事件，第二级才是事件本身。
    pub fn xen_evtchn_do_upcall(&self) {
        let cpu = self.irq_core.current_cpu();
        let state = &self.upcall_state[cpu.data() as usize];
        let vcpu_info = self.shared.vcpu(cpu);

        loop {
            vcpu_info.set_upcall_pending(false);

            if state.nesting_count.fetch_add(1, Ordering::SeqCst) != 0 {
                // 嵌套进入：外层调用会观察到重新置位的upcall_pending
                // 并多扫一遍，这里直接折叠返回
                return;
            }

            let mut pending_words = vcpu_info.xchg_pending_sel() & PENDING_SEL_MASK;

            let start_word_idx = state.current_word_idx.load(Ordering::Relaxed);
            let start_bit_idx = state.current_bit_idx.load(Ordering::Relaxed);

            let mut word_idx = start_word_idx;

            let mut i = 0;
            while pending_words != 0 {
                // 只考虑word_idx及更高的字；全部被滤掉时回绕到开头
                let words = mask_lsbs(pending_words, word_idx);
                if words == 0 {
                    word_idx = 0;
                    i += 1;
                    continue;
                }
                word_idx = words.trailing_zeros() as usize;

                let mut pending_bits = self.active_evtchns(cpu, word_idx);

                // 通常整个字从头扫起
                let mut bit_idx = 0;
                if word_idx == start_word_idx {
                    // 起始字分两段扫描
                    if i == 0 {
                        // 第一遍：从游标处继续
                        bit_idx = start_bit_idx;
                    } else {
                        // 第二遍：只看第一遍没覆盖的低位部分
                        pending_bits &= (1usize << start_bit_idx) - 1;
                    }
                }

                loop {
                    let bits = mask_lsbs(pending_bits, bit_idx);

                    // 剩余位全空则换下一个字
                    if bits == 0 {
                        break;
                    }
                    bit_idx = bits.trailing_zeros() as usize;

                    // 处理这个端口
                    let port =
                        EventChannelPort::new((word_idx * EVTCHN_WORD_BITS + bit_idx) as u32);
                    let irq = self.port_table.lookup_irq(port);

                    // 先屏蔽再清pending，处理程序看到的是稳定状态
                    self.shared.mask_evtchn(port);
                    self.shared.clear_evtchn(port);

                    if let Some(irq) = irq {
                        self.irq_core.dispatch(irq).ok();
                    }

                    bit_idx = (bit_idx + 1) % EVTCHN_WORD_BITS;

                    // 下一次调用从刚处理完的端口之后开始
                    state.current_word_idx.store(
                        if bit_idx != 0 {
                            word_idx
                        } else {
                            (word_idx + 1) % EVTCHN_WORD_BITS
                        },
                        Ordering::Relaxed,
                    );
                    state.current_bit_idx.store(bit_idx, Ordering::Relaxed);

                    if bit_idx == 0 {
                        break;
                    }
                }

                // 起始字要被检查两遍，其余字一遍
                if word_idx != start_word_idx || i != 0 {
                    pending_words &= !(1usize << word_idx);
                }

                word_idx = (word_idx + 1) % EVTCHN_WORD_BITS;
                i += 1;
            }

            let count = state.nesting_count.swap(0, Ordering::SeqCst);
            if count == 1 && !vcpu_info.upcall_pending() {
                return;
            }
        }
    }

    /// 某个字中当前可投递的端口集合
    #[inline]
    fn active_evtchns(&self, cpu: ProcessorId, word_idx: usize) -> usize {
        self.shared.pending_word(word_idx)
            & self.port_table.cpu_mask_word(cpu, word_idx)
            & !self.shared.mask_word(word_idx)
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::build_manager;
    use super::*;
    use crate::irqcore::IrqNumber;

    /// 让端口处于可投递状态：绑定、解除屏蔽、置pending、置selector位
    fn arm_port(
        manager: &alloc::sync::Arc<super::EvtchnManager>,
        port: u32,
    ) -> IrqNumber {
        let port = EventChannelPort::new(port);
        let irq = manager.bind_evtchn_to_irq(port).unwrap();
        manager.shared.clear_mask(port);
        manager.shared.set_evtchn(port);
        manager
            .shared
            .vcpu(crate::smp::ProcessorId::new(0))
            .test_and_set_pending_sel(port.word_index());
        irq
    }

    #[test]
    fn test_two_level_scan_order_and_cursor() {
        let (manager, _hv, irq_core) = build_manager();
        irq_core.set_current_cpu(crate::smp::ProcessorId::new(0));

        // pending[0] = 0b1010, pending[5] = 0b1
        let irq1 = arm_port(&manager, 1);
        let irq3 = arm_port(&manager, 3);
        let irq320 = arm_port(&manager, 320);

        let state = &manager.upcall_state[0];
        assert_eq!(state.cursor(), (0, 0));

        manager.xen_evtchn_do_upcall();

        // 投递顺序：端口1、端口3、端口320
        assert_eq!(irq_core.take_dispatched(), vec![irq1, irq3, irq320]);
        // 游标停在已处理端口之后
        assert_eq!(state.cursor(), (5, 1));

        // 每个端口都被消费：先屏蔽后清pending
        for port in [1u32, 3, 320] {
            let port = EventChannelPort::new(port);
            assert!(!manager.shared.test_evtchn(port));
            assert!(manager.shared.is_masked(port));
        }
    }

    #[test]
    fn test_unbound_port_consumed_silently() {
        let (manager, _hv, irq_core) = build_manager();
        irq_core.set_current_cpu(crate::smp::ProcessorId::new(0));

        let port = EventChannelPort::new(9);
        manager.shared.clear_mask(port);
        manager.shared.set_evtchn(port);
        manager
            .shared
            .vcpu(crate::smp::ProcessorId::new(0))
            .test_and_set_pending_sel(0);

        manager.xen_evtchn_do_upcall();

        assert!(irq_core.take_dispatched().is_empty());
        assert!(!manager.shared.test_evtchn(port));
        assert!(manager.shared.is_masked(port));
    }

    #[test]
    fn test_cursor_round_robin_no_starvation() {
        let (manager, _hv, irq_core) = build_manager();
        irq_core.set_current_cpu(crate::smp::ProcessorId::new(0));

        let irq1 = arm_port(&manager, 1);
        let irq3 = arm_port(&manager, 3);

        manager.xen_evtchn_do_upcall();
        assert_eq!(irq_core.take_dispatched(), vec![irq1, irq3]);
        let state = &manager.upcall_state[0];
        assert_eq!(state.cursor(), (0, 4));

        // 两个端口再次变为可投递：扫描从游标处开始，回绕后低位
        // 部分在第二遍被覆盖，没有端口被跳过，也没有重复投递
        for port in [1u32, 3] {
            let port = EventChannelPort::new(port);
            manager.shared.clear_mask(port);
            manager.shared.set_evtchn(port);
            manager.shared.vcpu(crate::smp::ProcessorId::new(0)).test_and_set_pending_sel(0);
        }

        manager.xen_evtchn_do_upcall();
        assert_eq!(irq_core.take_dispatched(), vec![irq1, irq3]);
        assert_eq!(state.cursor(), (0, 4));
    }

    #[test]
    fn test_masked_port_not_delivered() {
        let (manager, _hv, irq_core) = build_manager();
        irq_core.set_current_cpu(crate::smp::ProcessorId::new(0));

        let port = EventChannelPort::new(2);
        manager.bind_evtchn_to_irq(port).unwrap();
        // 保持屏蔽状态，仅置pending与selector
        manager.shared.set_evtchn(port);
        manager
            .shared
            .vcpu(crate::smp::ProcessorId::new(0))
            .test_and_set_pending_sel(0);

        manager.xen_evtchn_do_upcall();

        assert!(irq_core.take_dispatched().is_empty());
        // 事件保留在pending中，解除屏蔽后依然能被补发
        assert!(manager.shared.test_evtchn(port));
    }

    #[test]
    fn test_event_arriving_mid_scan_causes_extra_pass() {
        let (manager, _hv, irq_core) = build_manager();
        irq_core.set_current_cpu(crate::smp::ProcessorId::new(0));

        let irq1 = arm_port(&manager, 1);

        // 端口40已绑定但尚未pending；第一个事件处理期间它才到达
        let port40 = EventChannelPort::new(40);
        let irq40 = manager.bind_evtchn_to_irq(port40).unwrap();
        manager.shared.clear_mask(port40);

        let m = manager.clone();
        *irq_core.dispatch_hook.lock() = Some(alloc::boxed::Box::new(move |_irq| {
            m.shared.set_evtchn(port40);
            m.shared
                .vcpu(crate::smp::ProcessorId::new(0))
                .test_and_set_pending_sel(port40.word_index());
            m.shared
                .vcpu(crate::smp::ProcessorId::new(0))
                .set_upcall_pending(true);
        }));

        manager.xen_evtchn_do_upcall();

        // 外层循环观察到新的upcall_pending，额外扫了一遍
        assert_eq!(irq_core.take_dispatched(), vec![irq1, irq40]);
        assert!(!manager.shared.test_evtchn(port40));
    }
}
