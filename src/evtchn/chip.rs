use core::sync::atomic::Ordering;

use alloc::sync::{Arc, Weak};

use log::info;
use system_error::SystemError;

use crate::hypercall::{BindPirqFlags, EventChannelOp, PhysdevOp, XenIrqStatus};
use crate::irqcore::IrqNumber;
use crate::irqchip::{IrqChip, IrqChipFlags, IrqChipSetMaskResult};
use crate::libs::cpumask::CpuMask;

use super::manage::EvtchnManager;
use super::{EventChannelPort, PirqFlags};

impl EvtchnManager {
    /// 屏蔽IRQ对应的端口
    pub(super) fn mask_irq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            self.shared.mask_evtchn(evtchn);
        }
    }

    /// 解除IRQ对应端口的屏蔽
    pub(super) fn unmask_irq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            self.unmask_evtchn(evtchn);
        }
    }

    /// 解除一个端口的屏蔽
    ///
    /// 端口被屏蔽期间到达的事件不会产生新的上行调用——就像真实的
    /// IO-APIC一样，屏蔽会"丢失中断边沿"。因此本地路径在清除mask位
    /// 之后需要手动补回selector位与`upcall_pending`，模拟出丢失的
    /// 边沿；端口归属其他CPU时无法在本地补偿，改用hypercall，让
    /// 正确的VCPU收到selector更新。
    pub(super) fn unmask_evtchn(&self, evtchn: EventChannelPort) {
        let cpu = self.irq_core.current_cpu();

        if self.cpu_from_evtchn(evtchn) != cpu {
            // 慢路径：非本地端口
            self.hv
                .event_channel_op(EventChannelOp::Unmask { port: evtchn })
                .ok();
        } else {
            let vcpu_info = self.shared.vcpu(cpu);

            self.shared.clear_mask(evtchn);

            if self.shared.test_evtchn(evtchn)
                && !vcpu_info.test_and_set_pending_sel(evtchn.word_index())
            {
                vcpu_info.set_upcall_pending(true);
            }
        }
    }

    /// 动态/每CPU通道的ack：完成挂起的亲和性迁移，并在中断线
    /// 未被禁用的情况下重新打开端口
    pub(super) fn ack_dynirq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);

        self.irq_core.irq_move_masked(irq);

        if evtchn.is_valid() && !self.irq_core.is_disabled(irq) {
            self.unmask_evtchn(evtchn);
        }
    }

    /// 向当前CPU重新触发一次事件
    ///
    /// 原子地置位mask与pending后再按需解除屏蔽，制造一个新的边沿。
    pub(super) fn retrigger_evtchn(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let evtchn = self.evtchn_from_irq(irq);
        if !evtchn.is_valid() {
            return Err(SystemError::EINVAL);
        }

        let masked = self.shared.test_and_set_mask(evtchn);
        self.shared.set_evtchn(evtchn);
        if !masked {
            self.unmask_evtchn(evtchn);
        }

        return Ok(());
    }

    /// 把端口的投递目标迁移到另一个VCPU
    pub(super) fn rebind_irq_to_cpu(
        &self,
        irq: IrqNumber,
        tcpu: crate::smp::ProcessorId,
    ) -> Result<IrqChipSetMaskResult, SystemError> {
        let evtchn = self.evtchn_from_irq(irq);
        if !evtchn.is_valid() {
            return Err(SystemError::EINVAL);
        }

        // hypervisor拒绝迁移通常说明这是virq/ipi通道，它们本来就
        // 不需要（也不能）迁移：静默忽略，同时跳过本地的表更新
        if self
            .hv
            .event_channel_op(EventChannelOp::BindVcpu {
                port: evtchn,
                vcpu: tcpu,
            })
            .is_ok()
        {
            let inner = self.inner.lock_irqsave();
            self.do_bind_evtchn_to_cpu(&inner, evtchn, tcpu);
        }

        return Ok(IrqChipSetMaskResult::Success);
    }

    pub(super) fn set_affinity_irq(
        &self,
        irq: IrqNumber,
        dest: &CpuMask,
    ) -> Result<IrqChipSetMaskResult, SystemError> {
        let tcpu = dest.first().ok_or(SystemError::EINVAL)?;
        return self.rebind_irq_to_cpu(irq, tcpu);
    }

    /// pass-through中断的EOI
    ///
    /// needs_eoi位清零、或者共享位图握手未生效时，端口的unmask由
    /// 本地完成；needs_eoi位置位时向hypervisor发出显式EOI（握手生
    /// 效时hypervisor会在EOI中顺带完成unmask）。两个条件相互独立。
    pub(super) fn pirq_eoi(&self, irq: IrqNumber) {
        let info = match self.info_for_irq(irq) {
            Some(info) => info,
            None => return,
        };
        let pirq = match info.pirq() {
            Some(pirq) => pirq,
            None => return,
        };

        let need_eoi = self.port_table.pirq_needs_eoi(pirq.gsi);
        let does_unmask = self.pirq_eoi_does_unmask.load(Ordering::SeqCst);

        if !need_eoi || !does_unmask {
            let evtchn = info.evtchn();
            if evtchn.is_valid() {
                self.unmask_evtchn(evtchn);
            }
        }

        if need_eoi {
            self.hv
                .physdev_op(PhysdevOp::Eoi { gsi: pirq.gsi })
                .ok();
        }
    }

    /// 查询GSI是否需要EOI，并更新共享位图
    ///
    /// 共享位图握手生效时该信息由hypervisor直接维护，无需查询。
    pub(super) fn pirq_query_unmask(&self, irq: IrqNumber) {
        if self.pirq_eoi_does_unmask.load(Ordering::SeqCst) {
            return;
        }

        let pirq = match self.info_for_irq(irq).and_then(|info| info.pirq()) {
            Some(pirq) => pirq,
            None => return,
        };

        let flags = self
            .hv
            .physdev_op(PhysdevOp::IrqStatusQuery { gsi: pirq.gsi })
            .map(XenIrqStatus::from_bits_truncate)
            .unwrap_or(XenIrqStatus::empty());

        self.port_table
            .set_pirq_needs_eoi(pirq.gsi, flags.contains(XenIrqStatus::NEEDS_EOI));
    }

    /// 延迟到startup才真正执行的BIND_PIRQ
    ///
    /// 中断探测（probing）期间startup也会被调用；此时绑定失败是
    /// 正常现象，不产生日志，返回成功但不建立端口。
    pub(super) fn startup_pirq(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let evtchn = self.evtchn_from_irq(irq);

        if !evtchn.is_valid() {
            let pirq = match self.info_for_irq(irq).and_then(|info| info.pirq()) {
                Some(pirq) => pirq,
                None => return Err(SystemError::EINVAL),
            };

            // NB. 除非正在探测，我们乐于共享
            let bind_flags = if pirq.flags.contains(PirqFlags::SHAREABLE) {
                BindPirqFlags::WILL_SHARE
            } else {
                BindPirqFlags::empty()
            };

            let evtchn = match self.hv.event_channel_op(EventChannelOp::BindPirq {
                pirq: pirq.gsi,
                flags: bind_flags,
            }) {
                Ok(port) => port,
                Err(_) => {
                    if !self.probing_irq(irq) {
                        info!(
                            "Failed to obtain physical IRQ {} (GSI:{})",
                            irq.data(),
                            pirq.gsi.data()
                        );
                    }
                    return Ok(());
                }
            };

            self.pirq_query_unmask(irq);

            let inner = self.inner.lock_irqsave();
            self.port_table.set_irq_mapping(evtchn, irq);
            self.irq_info[irq.data() as usize].set_evtchn(evtchn);
            self.do_bind_evtchn_to_cpu(&inner, evtchn, crate::smp::ProcessorId::new(0));
        }

        self.pirq_eoi(irq);

        return Ok(());
    }

    /// 关闭pass-through中断的端口
    pub(super) fn shutdown_pirq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);

        if !evtchn.is_valid() {
            return;
        }

        self.shared.mask_evtchn(evtchn);

        if self
            .hv
            .event_channel_op(EventChannelOp::Close { port: evtchn })
            .is_err()
        {
            panic!("Failed to close pirq event channel {}", evtchn.data());
        }

        let inner = self.inner.lock_irqsave();
        self.do_bind_evtchn_to_cpu(&inner, evtchn, crate::smp::ProcessorId::new(0));
        self.port_table.clear_irq_mapping(evtchn);
        self.irq_info[irq.data() as usize].set_evtchn(EventChannelPort::INVALID);
    }

    /// pass-through中断的ack：完成迁移后立即EOI
    pub(super) fn ack_pirq(&self, irq: IrqNumber) {
        self.irq_core.irq_move_masked(irq);
        self.pirq_eoi(irq);
    }

    /// pass-through中断流的结束回调
    pub(super) fn end_pirq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);

        if self.irq_core.is_disabled(irq) && self.irq_core.is_pending(irq) {
            self.shutdown_pirq(irq);
        } else if evtchn.is_valid() {
            self.pirq_eoi(irq);
        }
    }

    /// 是否处于中断探测过程中（startup时还没有注册任何处理动作）
    fn probing_irq(&self, irq: IrqNumber) -> bool {
        return !self.irq_core.has_action(irq);
    }
}

/// 动态分配的域间事件通道所使用的芯片
pub struct XenDynamicChip {
    manager: Weak<EvtchnManager>,
}

impl XenDynamicChip {
    pub(super) fn new(manager: Weak<EvtchnManager>) -> Self {
        Self { manager }
    }

    fn manager(&self) -> Option<Arc<EvtchnManager>> {
        self.manager.upgrade()
    }
}

impl core::fmt::Debug for XenDynamicChip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("XenDynamicChip")
    }
}

impl IrqChip for XenDynamicChip {
    fn name(&self) -> &'static str {
        "xen-dyn"
    }

    fn irq_disable(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.mask_irq(irq);
        }
    }

    fn irq_mask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.mask_irq(irq);
        return Ok(());
    }

    fn irq_unmask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.unmask_irq(irq);
        return Ok(());
    }

    fn irq_eoi(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.ack_dynirq(irq);
        }
    }

    fn can_set_affinity(&self) -> bool {
        true
    }

    fn irq_set_affinity(
        &self,
        irq: IrqNumber,
        mask: &CpuMask,
    ) -> Result<IrqChipSetMaskResult, SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.set_affinity_irq(irq, mask);
    }

    fn retrigger(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.retrigger_evtchn(irq);
    }

    fn flags(&self) -> IrqChipFlags {
        IrqChipFlags::IRQCHIP_SKIP_SET_WAKE
    }
}

/// 每CPU通道（VIRQ/IPI）所使用的芯片
pub struct XenPercpuChip {
    manager: Weak<EvtchnManager>,
}

impl XenPercpuChip {
    pub(super) fn new(manager: Weak<EvtchnManager>) -> Self {
        Self { manager }
    }

    fn manager(&self) -> Option<Arc<EvtchnManager>> {
        self.manager.upgrade()
    }
}

impl core::fmt::Debug for XenPercpuChip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("XenPercpuChip")
    }
}

impl IrqChip for XenPercpuChip {
    fn name(&self) -> &'static str {
        "xen-percpu"
    }

    fn irq_disable(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.mask_irq(irq);
        }
    }

    fn irq_mask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.mask_irq(irq);
        return Ok(());
    }

    fn irq_unmask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.unmask_irq(irq);
        return Ok(());
    }

    fn irq_ack(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.ack_dynirq(irq);
        }
    }

    /// VIRQ/IPI通道固定绑定在其VCPU上，不参与亲和性平衡
    fn can_set_affinity(&self) -> bool {
        false
    }

    fn retrigger(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.retrigger_evtchn(irq);
    }

    fn flags(&self) -> IrqChipFlags {
        IrqChipFlags::IRQCHIP_SKIP_SET_WAKE
    }
}

/// pass-through物理中断所使用的芯片
pub struct XenPirqChip {
    manager: Weak<EvtchnManager>,
}

impl XenPirqChip {
    pub(super) fn new(manager: Weak<EvtchnManager>) -> Self {
        Self { manager }
    }

    fn manager(&self) -> Option<Arc<EvtchnManager>> {
        self.manager.upgrade()
    }
}

impl core::fmt::Debug for XenPirqChip {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("XenPirqChip")
    }
}

impl IrqChip for XenPirqChip {
    fn name(&self) -> &'static str {
        "xen-pirq"
    }

    fn irq_startup(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.startup_pirq(irq);
    }

    fn irq_shutdown(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.shutdown_pirq(irq);
        }
    }

    fn irq_enable(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.pirq_eoi(irq);
        return Ok(());
    }

    fn irq_disable(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.mask_irq(irq);
        }
    }

    fn irq_mask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.mask_irq(irq);
        return Ok(());
    }

    fn irq_unmask(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        manager.unmask_irq(irq);
        return Ok(());
    }

    fn irq_eoi(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.ack_pirq(irq);
        }
    }

    fn irq_end(&self, irq: IrqNumber) {
        if let Some(manager) = self.manager() {
            manager.end_pirq(irq);
        }
    }

    fn can_set_affinity(&self) -> bool {
        true
    }

    fn irq_set_affinity(
        &self,
        irq: IrqNumber,
        mask: &CpuMask,
    ) -> Result<IrqChipSetMaskResult, SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.set_affinity_irq(irq, mask);
    }

    fn retrigger(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let manager = self.manager().ok_or(SystemError::ENODEV)?;
        return manager.retrigger_evtchn(irq);
    }

    fn flags(&self) -> IrqChipFlags {
        IrqChipFlags::IRQCHIP_SKIP_SET_WAKE
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock::{build_manager, MockHypervisor, MockIrqCore, NOOP_HANDLER};
    use super::*;
    use crate::evtchn::manage::EvtchnManager;
    use crate::evtchn::EventChannelPort;
    use crate::hypercall::GsiNumber;
    use crate::irqcore::{IrqCoreOps, IrqHandleFlags};
    use crate::smp::ProcessorId;
    use alloc::sync::Arc;

    fn bind_port(
        manager: &Arc<EvtchnManager>,
        port: u32,
    ) -> (EventChannelPort, crate::irqcore::IrqNumber) {
        let port = EventChannelPort::new(port);
        let irq = manager.bind_evtchn_to_irq(port).unwrap();
        (port, irq)
    }

    #[test]
    fn test_unmask_edge_recovery_local() {
        let (manager, hv, irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 7);

        irq_core.set_current_cpu(ProcessorId::new(0));

        // 端口处于屏蔽状态时又有事件到达
        assert!(manager.shared.is_masked(port));
        manager.shared.set_evtchn(port);

        manager.unmask_irq(irq);

        // 丢失的边沿被手动补回：selector位与upcall_pending被置位，
        // 并且没有发出Unmask hypercall
        assert!(!manager.shared.is_masked(port));
        let vcpu = manager.shared.vcpu(ProcessorId::new(0));
        assert_eq!(vcpu.pending_sel(), 1 << 0);
        assert!(vcpu.upcall_pending());
        assert_eq!(
            hv.count_evtchn_calls(|op| matches!(op, EventChannelOp::Unmask { .. })),
            0
        );
    }

    #[test]
    fn test_unmask_without_pending_is_quiet() {
        let (manager, _hv, irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 7);

        irq_core.set_current_cpu(ProcessorId::new(0));
        manager.unmask_irq(irq);

        assert!(!manager.shared.is_masked(port));
        let vcpu = manager.shared.vcpu(ProcessorId::new(0));
        assert_eq!(vcpu.pending_sel(), 0);
        assert!(!vcpu.upcall_pending());
    }

    #[test]
    fn test_unmask_remote_port_uses_hypercall() {
        let (manager, hv, irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 7);

        // 端口归属CPU0，但当前在CPU1上执行
        irq_core.set_current_cpu(ProcessorId::new(1));
        manager.shared.set_evtchn(port);

        manager.unmask_irq(irq);

        assert!(hv
            .evtchn_calls
            .lock()
            .contains(&EventChannelOp::Unmask { port }));
        // 本地什么也不改，一切由hypervisor在正确的VCPU上完成
        assert!(manager.shared.is_masked(port));
        assert_eq!(manager.shared.vcpu(ProcessorId::new(1)).pending_sel(), 0);
    }

    #[test]
    fn test_set_affinity_moves_port() {
        let (manager, hv, _irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 100);

        let chip = manager.dynamic_chip();
        let result = chip
            .irq_set_affinity(irq, &CpuMask::single(ProcessorId::new(1)))
            .unwrap();
        assert_eq!(result, IrqChipSetMaskResult::Success);

        assert!(hv.evtchn_calls.lock().contains(&EventChannelOp::BindVcpu {
            port,
            vcpu: ProcessorId::new(1),
        }));
        assert!(!manager.port_table.port_on_cpu(port, ProcessorId::new(0)));
        assert!(manager.port_table.port_on_cpu(port, ProcessorId::new(1)));
        assert_eq!(
            manager.irq_info[irq.data() as usize].cpu(),
            ProcessorId::new(1)
        );
    }

    #[test]
    fn test_set_affinity_hypervisor_refusal_ignored() {
        let (manager, hv, _irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 100);

        *hv.bind_vcpu_error.lock() = Some(SystemError::EINVAL);
        let result = manager
            .set_affinity_irq(irq, &CpuMask::single(ProcessorId::new(1)))
            .unwrap();
        assert_eq!(result, IrqChipSetMaskResult::Success);

        // 表保持不动
        assert!(manager.port_table.port_on_cpu(port, ProcessorId::new(0)));
        assert_eq!(
            manager.irq_info[irq.data() as usize].cpu(),
            ProcessorId::new(0)
        );
    }

    #[test]
    fn test_retrigger_forces_new_edge() {
        let (manager, _hv, irq_core) = build_manager();
        let (port, irq) = bind_port(&manager, 12);

        irq_core.set_current_cpu(ProcessorId::new(0));
        manager.shared.clear_mask(port);

        manager.retrigger_evtchn(irq).unwrap();

        // pending被置位，端口重新处于未屏蔽状态，并且边沿已经补发
        assert!(manager.shared.test_evtchn(port));
        assert!(!manager.shared.is_masked(port));
        assert!(manager.shared.vcpu(ProcessorId::new(0)).upcall_pending());

        // 事先已屏蔽的端口保持屏蔽
        let (port2, irq2) = bind_port(&manager, 13);
        manager.retrigger_evtchn(irq2).unwrap();
        assert!(manager.shared.test_evtchn(port2));
        assert!(manager.shared.is_masked(port2));
    }

    #[test]
    fn test_ack_dynirq_unmasks_when_enabled() {
        let (manager, _hv, irq_core) = build_manager();

        let irq = manager
            .bind_evtchn_to_irqhandler(
                EventChannelPort::new(21),
                &NOOP_HANDLER,
                IrqHandleFlags::empty(),
                "event",
                None,
            )
            .unwrap();
        let port = EventChannelPort::new(21);
        irq_core.set_current_cpu(ProcessorId::new(0));

        manager.shared.mask_evtchn(port);
        manager.dynamic_chip().irq_eoi(irq);
        assert!(!manager.shared.is_masked(port));
        assert_eq!(irq_core.descs.lock().get(&irq.data()).unwrap().moved, 1);

        // 中断线被禁用时eoi不会重新打开端口
        irq_core.disable_irq(irq);
        assert!(manager.shared.is_masked(port));
        manager.dynamic_chip().irq_eoi(irq);
        assert!(manager.shared.is_masked(port));
    }

    #[test]
    fn test_startup_pirq_probing_is_silent() {
        let (manager, hv, irq_core) = build_manager();

        let irq = manager
            .xen_allocate_pirq(GsiNumber::new(20), false, "probe")
            .unwrap();

        *hv.bind_pirq_error.lock() = Some(SystemError::EBUSY);
        let chip = irq_core.chip_of(irq).unwrap();

        // 探测中的startup静默失败并返回成功
        assert_eq!(chip.irq_startup(irq), Ok(()));
        assert!(!manager.evtchn_from_irq(irq).is_valid());
        assert_eq!(
            hv.count_evtchn_calls(|op| matches!(op, EventChannelOp::BindPirq { .. })),
            1
        );
    }

    #[test]
    fn test_startup_pirq_binds_lazily() {
        let (manager, hv, irq_core) = build_manager();

        hv.pirq_ports.lock().push_back(200);
        hv.irq_status
            .lock()
            .insert(20, XenIrqStatus::NEEDS_EOI.bits());

        let irq = manager
            .xen_allocate_pirq(GsiNumber::new(20), true, "nic")
            .unwrap();
        assert!(!manager.evtchn_from_irq(irq).is_valid());

        // 注册处理程序触发startup，此刻才真正BIND_PIRQ
        manager
            .bind_pirq_to_irqhandler_for_test(irq, &irq_core)
            .unwrap();

        assert!(hv.evtchn_calls.lock().contains(&EventChannelOp::BindPirq {
            pirq: GsiNumber::new(20),
            flags: BindPirqFlags::WILL_SHARE,
        }));
        let port = EventChannelPort::new(200);
        assert_eq!(manager.evtchn_from_irq(irq), port);
        assert_eq!(manager.irq_from_evtchn(port), Some(irq));
        assert!(manager.port_table.pirq_needs_eoi(GsiNumber::new(20)));
        // 初始eoi：needs_eoi置位且无共享位图握手 → 本地unmask + 显式EOI
        assert!(!manager.shared.is_masked(port));
        assert!(hv
            .physdev_calls
            .lock()
            .iter()
            .any(|op| matches!(op, PhysdevOp::Eoi { .. })));
    }

    #[test]
    fn test_pirq_eoi_with_shared_bitmap_handshake() {
        let hv = MockHypervisor::with_eoi_gmfn();
        let irq_core = MockIrqCore::new();
        let manager = EvtchnManager::new(hv.clone(), irq_core.clone());

        hv.pirq_ports.lock().push_back(201);
        let irq = manager
            .xen_allocate_pirq(GsiNumber::new(21), false, "nic")
            .unwrap();
        manager
            .bind_pirq_to_irqhandler_for_test(irq, &irq_core)
            .unwrap();
        let port = EventChannelPort::new(201);

        // 握手生效时needs_eoi的维护全在hypervisor侧
        manager.port_table.set_pirq_needs_eoi(GsiNumber::new(21), true);
        manager.shared.mask_evtchn(port);
        hv.physdev_calls.lock().clear();

        manager.pirq_eoi(irq);

        // 不做本地unmask，EOI hypercall会顺带完成它
        assert!(manager.shared.is_masked(port));
        assert!(hv
            .physdev_calls
            .lock()
            .iter()
            .any(|op| matches!(op, PhysdevOp::Eoi { .. })));
    }

    #[test]
    fn test_shutdown_pirq_closes_port() {
        let (manager, hv, irq_core) = build_manager();

        hv.pirq_ports.lock().push_back(202);
        let irq = manager
            .xen_allocate_pirq(GsiNumber::new(22), false, "nic")
            .unwrap();
        manager
            .bind_pirq_to_irqhandler_for_test(irq, &irq_core)
            .unwrap();
        let port = EventChannelPort::new(202);

        manager.shutdown_pirq(irq);

        assert!(hv
            .evtchn_calls
            .lock()
            .contains(&EventChannelOp::Close { port }));
        assert!(manager.shared.is_masked(port));
        assert!(!manager.evtchn_from_irq(irq).is_valid());
        assert_eq!(manager.irq_from_evtchn(port), None);
        // 绑定类型保留，startup可以再次建立端口
        assert_eq!(
            manager.irq_info[irq.data() as usize].irq_type(),
            crate::evtchn::XenIrqType::Pirq
        );
    }

    #[test]
    fn test_end_pirq_shutdown_when_disabled_and_pending() {
        let (manager, hv, irq_core) = build_manager();

        hv.pirq_ports.lock().push_back(203);
        let irq = manager
            .xen_allocate_pirq(GsiNumber::new(23), false, "nic")
            .unwrap();
        manager
            .bind_pirq_to_irqhandler_for_test(irq, &irq_core)
            .unwrap();
        let port = EventChannelPort::new(203);

        irq_core.disable_irq(irq);
        irq_core.set_pending(irq, true);

        manager.end_pirq(irq);

        assert!(hv
            .evtchn_calls
            .lock()
            .contains(&EventChannelOp::Close { port }));
        assert!(!manager.evtchn_from_irq(irq).is_valid());
    }
}

#[cfg(test)]
impl EvtchnManager {
    /// 测试辅助：用空处理程序注册pirq，触发startup路径
    pub(crate) fn bind_pirq_to_irqhandler_for_test(
        &self,
        irq: IrqNumber,
        irq_core: &alloc::sync::Arc<super::mock::MockIrqCore>,
    ) -> Result<(), SystemError> {
        use crate::irqcore::IrqCoreOps;
        irq_core.request_irq(
            irq,
            alloc::string::String::from("pirq-test"),
            &super::mock::NOOP_HANDLER,
            crate::irqcore::IrqHandleFlags::empty(),
            None,
        )
    }
}
