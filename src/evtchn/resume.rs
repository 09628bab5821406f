use core::sync::atomic::Ordering;

use crate::hypercall::{EventChannelOp, PhysdevOp};
use crate::irqcore::{IrqHandleFlags, IrqNumber};
use crate::libs::spinlock::SpinLockGuard;
use crate::smp::ProcessorId;

use super::manage::{EvtchnManager, InnerEvtchnManager, EVTCHN_DEFAULT_AFFINITY};
use super::{IrqPayload, XenIrqType, NR_IPIS, NR_VIRQS};

impl EvtchnManager {
    /// suspend/resume之后重建事件通道子系统
    ///
    /// 恢复时hypervisor已经作废了整个端口空间：所有端口都要重新
    /// 屏蔽，每CPU的VIRQ/IPI通道在这里重新绑定；域间通道与pirq由
    /// 更上层的驱动恢复。
    pub fn xen_irq_resume(&self) {
        let inner = self.inner.lock_irqsave();

        // 每个端口在逻辑上都回到CPU0
        self.init_evtchn_cpu_bindings();

        // 新的端口空间还没有任何端口生效
        self.shared.mask_all();

        // 清空所有IRQ<->端口映射（保留绑定类型与负载）
        for info in self.irq_info.iter() {
            info.set_evtchn(super::EventChannelPort::INVALID);
        }
        self.port_table.clear_all_mappings();

        for cpu in 0..self.nr_cpus {
            let cpu = ProcessorId::new(cpu);
            self.restore_cpu_virqs(&inner, cpu);
            self.restore_cpu_ipis(&inner, cpu);
        }

        drop(inner);

        // 重新打开IRQF_NO_SUSPEND且处于使能状态的中断：
        // 宿主的中断核心在挂起时跳过了它们，恢复时也不会替我们做
        for irq in 0..self.irq_core.nr_irqs() {
            let irq = IrqNumber::new(irq);

            let flags = match self.irq_core.irq_flags(irq) {
                Some(flags) => flags,
                None => continue,
            };
            if !flags.contains(IrqHandleFlags::IRQF_NO_SUSPEND) {
                continue;
            }
            if self.irq_core.is_disabled(irq) {
                continue;
            }

            let evtchn = self.evtchn_from_irq(irq);
            if evtchn.is_valid() {
                self.unmask_evtchn(evtchn);
            }
        }

        // 共享EOI位图页需要向新的hypervisor实例重新注册
        if self.pirq_eoi_does_unmask.load(Ordering::SeqCst) {
            let gmfn = self.port_table.pirq_eoi_gmfn();
            if self
                .hv
                .physdev_op(PhysdevOp::PirqEoiGmfn { gmfn })
                .is_err()
            {
                panic!("Failed to re-register pirq eoi bitmap page");
            }
        }
    }

    /// 重置端口归属与描述符亲和性：默认所有事件通道都通知CPU0
    fn init_evtchn_cpu_bindings(&self) {
        for irq in 0..self.irq_core.nr_irqs() {
            self.irq_core
                .desc_set_affinity(IrqNumber::new(irq), &EVTCHN_DEFAULT_AFFINITY);
        }
        self.port_table.init_cpu_bindings();
    }

    /// 重新绑定某个CPU上的所有VIRQ通道
    fn restore_cpu_virqs(
        &self,
        inner: &SpinLockGuard<'_, InnerEvtchnManager>,
        cpu: ProcessorId,
    ) {
        for virq in 0..NR_VIRQS {
            let irq = match inner.virq_to_irq[cpu.data() as usize][virq] {
                Some(irq) => irq,
                None => continue,
            };

            let info = &self.irq_info[irq.data() as usize];
            debug_assert_eq!(info.irq_type(), XenIrqType::Virq);
            let virq = match info.virq() {
                Some(virq) => virq,
                None => continue,
            };

            // 向hypervisor要一个新的绑定
            let evtchn = match self
                .hv
                .event_channel_op(EventChannelOp::BindVirq { virq, vcpu: cpu })
            {
                Ok(port) => port,
                Err(e) => panic!(
                    "Failed to rebind virq {} on cpu {}: {:?}",
                    virq.data(),
                    cpu.data(),
                    e
                ),
            };

            // 记录新的映射
            info.fill(
                XenIrqType::Virq,
                evtchn,
                ProcessorId::new(0),
                IrqPayload::Virq(virq),
            );
            self.port_table.set_irq_mapping(evtchn, irq);
            self.do_bind_evtchn_to_cpu(inner, evtchn, cpu);
        }
    }

    /// 重新绑定某个CPU上的所有IPI通道
    fn restore_cpu_ipis(
        &self,
        inner: &SpinLockGuard<'_, InnerEvtchnManager>,
        cpu: ProcessorId,
    ) {
        for ipi in 0..NR_IPIS {
            let irq = match inner.ipi_to_irq[cpu.data() as usize][ipi] {
                Some(irq) => irq,
                None => continue,
            };

            let info = &self.irq_info[irq.data() as usize];
            debug_assert_eq!(info.irq_type(), XenIrqType::Ipi);
            let ipi = match info.ipi() {
                Some(ipi) => ipi,
                None => continue,
            };

            let evtchn = match self
                .hv
                .event_channel_op(EventChannelOp::BindIpi { vcpu: cpu })
            {
                Ok(port) => port,
                Err(e) => panic!(
                    "Failed to rebind ipi {} on cpu {}: {:?}",
                    ipi.data(),
                    cpu.data(),
                    e
                ),
            };

            info.fill(
                XenIrqType::Ipi,
                evtchn,
                ProcessorId::new(0),
                IrqPayload::Ipi(ipi),
            );
            self.port_table.set_irq_mapping(evtchn, irq);
            self.do_bind_evtchn_to_cpu(inner, evtchn, cpu);
        }
    }
}
