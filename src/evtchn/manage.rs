use core::sync::atomic::{AtomicBool, Ordering};

use alloc::boxed::Box;
use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec::Vec;

use log::{info, warn};
use system_error::SystemError;

use crate::hypercall::{
    DomainId, EventChannelOp, GsiNumber, HvmParam, HypervisorOps, PhysdevMapPirq, PhysdevOp,
};
use crate::irqcore::{IrqCoreOps, IrqFlowType, IrqHandleFlags, IrqHandler, IrqHandlerData, IrqNumber};
use crate::irqchip::IrqChip;
use crate::libs::cpumask::CpuMask;
use crate::libs::spinlock::{SpinLock, SpinLockGuard};
use crate::smp::ProcessorId;

use super::chip::{XenDynamicChip, XenPercpuChip, XenPirqChip};
use super::porttable::PortTable;
use super::shared::SharedInfo;
use super::upcall::UpcallState;
use super::{
    EventChannelPort, IpiVector, IrqInfo, IrqPayload, PirqFlags, PirqInfo, VirqNumber, XenIrqType,
    NR_EVENT_CHANNELS, NR_IPIS, NR_VIRQS,
};

lazy_static! {
    /// 事件通道的默认亲和性
    pub(super) static ref EVTCHN_DEFAULT_AFFINITY: CpuMask = {
        let mut mask = CpuMask::new();
        // 默认情况下，所有事件通道都投递到CPU0
        mask.set(ProcessorId::new(0), true);
        mask
    };
}

/// 受全局映射锁保护的反向查询表
pub(super) struct InnerEvtchnManager {
    /// (cpu, virq) → irq
    pub(super) virq_to_irq: Vec<[Option<IrqNumber>; NR_VIRQS]>,
    /// (cpu, ipi) → irq
    pub(super) ipi_to_irq: Vec<[Option<IrqNumber>; NR_IPIS]>,
}

/// 事件通道管理器
///
/// 全局映射锁（`inner`）保护映射表的所有更新；读取映射表不需要
/// 持有该锁（见`IrqInfo`与`PortTable`的发布顺序约定）。
pub struct EvtchnManager {
    pub(super) hv: Arc<dyn HypervisorOps>,
    pub(super) irq_core: Arc<dyn IrqCoreOps>,
    pub(super) shared: SharedInfo,
    pub(super) port_table: PortTable,
    pub(super) irq_info: Box<[IrqInfo]>,
    pub(super) upcall_state: Box<[UpcallState]>,
    pub(super) inner: SpinLock<InnerEvtchnManager>,
    /// hypervisor是否支持经由共享位图页的EOI-unmask握手
    pub(super) pirq_eoi_does_unmask: AtomicBool,
    dynamic_chip: Arc<XenDynamicChip>,
    percpu_chip: Arc<XenPercpuChip>,
    pirq_chip: Arc<XenPirqChip>,
    pub(super) nr_cpus: u32,
}

impl EvtchnManager {
    /// 创建并初始化事件通道子系统
    #[inline(never)]
    pub fn new(hv: Arc<dyn HypervisorOps>, irq_core: Arc<dyn IrqCoreOps>) -> Arc<Self> {
        let nr_cpus = irq_core.possible_cpus();
        let nr_irqs = irq_core.nr_irqs();

        let manager = Arc::new_cyclic(|weak| {
            let mut irq_info = Vec::with_capacity(nr_irqs as usize);
            irq_info.resize_with(nr_irqs as usize, IrqInfo::new);

            let mut upcall_state = Vec::with_capacity(nr_cpus as usize);
            upcall_state.resize_with(nr_cpus as usize, UpcallState::new);

            EvtchnManager {
                shared: SharedInfo::new(nr_cpus as usize),
                port_table: PortTable::new(nr_cpus as usize, nr_irqs as usize),
                irq_info: irq_info.into_boxed_slice(),
                upcall_state: upcall_state.into_boxed_slice(),
                inner: SpinLock::new(InnerEvtchnManager {
                    virq_to_irq: vec![[None; NR_VIRQS]; nr_cpus as usize],
                    ipi_to_irq: vec![[None; NR_IPIS]; nr_cpus as usize],
                }),
                pirq_eoi_does_unmask: AtomicBool::new(false),
                dynamic_chip: Arc::new(XenDynamicChip::new(weak.clone())),
                percpu_chip: Arc::new(XenPercpuChip::new(weak.clone())),
                pirq_chip: Arc::new(XenPirqChip::new(weak.clone())),
                hv,
                irq_core,
                nr_cpus,
            }
        });

        // 注册pirq的EOI共享位图页；注册成功说明hypervisor会在
        // PHYSDEV_eoi时根据该页自行解除端口屏蔽
        let gmfn = manager.port_table.pirq_eoi_gmfn();
        if manager
            .hv
            .physdev_op(PhysdevOp::PirqEoiGmfn { gmfn })
            .is_ok()
        {
            manager.pirq_eoi_does_unmask.store(true, Ordering::SeqCst);
        }

        // 此刻还没有任何端口是活动的
        manager.shared.mask_all();

        return manager;
    }

    #[inline]
    pub(super) fn info_for_irq(&self, irq: IrqNumber) -> Option<&IrqInfo> {
        self.irq_info.get(irq.data() as usize)
    }

    /// IRQ→端口查询；未绑定时返回`EventChannelPort::INVALID`
    pub fn evtchn_from_irq(&self, irq: IrqNumber) -> EventChannelPort {
        self.info_for_irq(irq)
            .map(|info| info.evtchn())
            .unwrap_or(EventChannelPort::INVALID)
    }

    /// 端口→IRQ查询
    pub fn irq_from_evtchn(&self, evtchn: EventChannelPort) -> Option<IrqNumber> {
        self.port_table.lookup_irq(evtchn)
    }

    /// 端口当前的投递CPU；未绑定的端口归属CPU0
    pub(super) fn cpu_from_evtchn(&self, evtchn: EventChannelPort) -> ProcessorId {
        self.port_table
            .lookup_irq(evtchn)
            .and_then(|irq| self.info_for_irq(irq))
            .map(|info| info.cpu())
            .unwrap_or(ProcessorId::new(0))
    }

    pub(super) fn dynamic_chip(&self) -> Arc<dyn IrqChip> {
        self.dynamic_chip.clone()
    }

    pub(super) fn percpu_chip(&self) -> Arc<dyn IrqChip> {
        self.percpu_chip.clone()
    }

    pub(super) fn pirq_chip(&self) -> Arc<dyn IrqChip> {
        self.pirq_chip.clone()
    }

    /// 寻找一个未被占用的动态IRQ槽位
    ///
    /// 从`nr_irqs - 1`向下扫描到硬件身份映射区间的上界。一个槽位
    /// 可用，当且仅当宿主描述符不存在/未绑定芯片，或者已经挂着
    /// 动态芯片且绑定类型为Unbound。动态池耗尽是不可恢复的。
    fn find_unbound_irq(&self) -> Result<IrqNumber, SystemError> {
        let start = self.irq_core.nr_hw_irqs();
        let nr_irqs = self.irq_core.nr_irqs();
        assert!(start < nr_irqs, "no dynamic irq space at all");

        let dynamic_chip: Arc<dyn IrqChip> = self.dynamic_chip();
        let mut irq = nr_irqs - 1;
        while irq > start {
            match self.irq_core.chip_of(IrqNumber::new(irq)) {
                None => break,
                Some(chip) => {
                    if Arc::ptr_eq(&chip, &dynamic_chip)
                        && self.irq_info[irq as usize].irq_type() == XenIrqType::Unbound
                    {
                        break;
                    }
                }
            }
            irq -= 1;
        }

        if irq == start {
            panic!("No available IRQ to bind to: increase nr_irqs!");
        }

        let irq = IrqNumber::new(irq);
        self.irq_core.activate_irq(irq)?;
        return Ok(irq);
    }

    /// 查找已经映射了指定GSI的pass-through中断
    fn find_irq_by_gsi(&self, gsi: GsiNumber) -> Option<IrqNumber> {
        for (i, info) in self.irq_info.iter().enumerate() {
            if info.irq_type() != XenIrqType::Pirq {
                continue;
            }
            if info.pirq().map(|p| p.gsi) == Some(gsi) {
                return Some(IrqNumber::new(i as u32));
            }
        }
        return None;
    }

    /// 绑定一个（已经存在的）域间事件通道端口
    ///
    /// 端口已有绑定时直接返回现有IRQ。
    pub fn bind_evtchn_to_irq(&self, evtchn: EventChannelPort) -> Result<IrqNumber, SystemError> {
        if !evtchn.is_valid() || evtchn.data() as usize >= NR_EVENT_CHANNELS {
            return Err(SystemError::EINVAL);
        }

        let _inner = self.inner.lock_irqsave();

        if let Some(irq) = self.port_table.lookup_irq(evtchn) {
            return Ok(irq);
        }

        let irq = self.find_unbound_irq()?;
        self.irq_core.set_chip_and_handler(
            irq,
            self.dynamic_chip(),
            IrqFlowType::FastEoi,
            "event",
        );

        self.irq_info[irq.data() as usize].fill(
            XenIrqType::Evtchn,
            evtchn,
            ProcessorId::new(0),
            IrqPayload::None,
        );
        self.port_table.set_irq_mapping(evtchn, irq);

        return Ok(irq);
    }

    /// 与远端域建立一条域间通道并绑定
    pub fn bind_interdomain_evtchn_to_irq(
        &self,
        remote_domain: DomainId,
        remote_port: EventChannelPort,
    ) -> Result<IrqNumber, SystemError> {
        let local_port = self.hv.event_channel_op(EventChannelOp::BindInterdomain {
            remote_dom: remote_domain,
            remote_port,
        })?;
        return self.bind_evtchn_to_irq(local_port);
    }

    /// 将VIRQ绑定到指定CPU
    pub fn bind_virq_to_irq(
        &self,
        virq: VirqNumber,
        cpu: ProcessorId,
    ) -> Result<IrqNumber, SystemError> {
        if virq.data() as usize >= NR_VIRQS || cpu.data() >= self.nr_cpus {
            return Err(SystemError::EINVAL);
        }

        let mut inner = self.inner.lock_irqsave();

        if let Some(irq) = inner.virq_to_irq[cpu.data() as usize][virq.data() as usize] {
            return Ok(irq);
        }

        let irq = self.find_unbound_irq()?;
        self.irq_core
            .set_chip_and_handler(irq, self.percpu_chip(), IrqFlowType::PerCpu, "virq");

        let evtchn = match self
            .hv
            .event_channel_op(EventChannelOp::BindVirq { virq, vcpu: cpu })
        {
            Ok(port) => port,
            Err(e) => {
                // 绑定失败不得在表中留下任何痕迹
                self.irq_core.release_irq(irq);
                return Err(e);
            }
        };

        self.irq_info[irq.data() as usize].fill(
            XenIrqType::Virq,
            evtchn,
            ProcessorId::new(0),
            IrqPayload::Virq(virq),
        );
        self.port_table.set_irq_mapping(evtchn, irq);
        inner.virq_to_irq[cpu.data() as usize][virq.data() as usize] = Some(irq);

        self.do_bind_evtchn_to_cpu(&inner, evtchn, cpu);

        return Ok(irq);
    }

    /// 为指定CPU分配一个IPI通道
    pub fn bind_ipi_to_irq(
        &self,
        ipi: IpiVector,
        cpu: ProcessorId,
    ) -> Result<IrqNumber, SystemError> {
        if ipi.data() as usize >= NR_IPIS || cpu.data() >= self.nr_cpus {
            return Err(SystemError::EINVAL);
        }

        let mut inner = self.inner.lock_irqsave();

        if let Some(irq) = inner.ipi_to_irq[cpu.data() as usize][ipi.data() as usize] {
            return Ok(irq);
        }

        let irq = self.find_unbound_irq()?;
        self.irq_core
            .set_chip_and_handler(irq, self.percpu_chip(), IrqFlowType::PerCpu, "ipi");

        let evtchn = match self
            .hv
            .event_channel_op(EventChannelOp::BindIpi { vcpu: cpu })
        {
            Ok(port) => port,
            Err(e) => {
                self.irq_core.release_irq(irq);
                return Err(e);
            }
        };

        self.irq_info[irq.data() as usize].fill(
            XenIrqType::Ipi,
            evtchn,
            ProcessorId::new(0),
            IrqPayload::Ipi(ipi),
        );
        self.port_table.set_irq_mapping(evtchn, irq);
        inner.ipi_to_irq[cpu.data() as usize][ipi.data() as usize] = Some(irq);

        self.do_bind_evtchn_to_cpu(&inner, evtchn, cpu);

        return Ok(irq);
    }

    /// 为GSI分配一个pass-through中断（以及vector）
    ///
    /// 事件通道要等到中断真正startup时才会绑定。若该GSI已经有
    /// 对应的IRQ，则直接返回现有IRQ。
    pub fn xen_allocate_pirq(
        &self,
        gsi: GsiNumber,
        shareable: bool,
        name: &'static str,
    ) -> Result<IrqNumber, SystemError> {
        let nr_irqs = self.irq_core.nr_irqs();
        if gsi.data() >= nr_irqs {
            return Err(SystemError::EINVAL);
        }

        let _inner = self.inner.lock_irqsave();

        if let Some(irq) = self.find_irq_by_gsi(gsi) {
            info!(
                "xen_allocate_pirq: returning irq {} for gsi {}",
                irq.data(),
                gsi.data()
            );
            return Ok(irq);
        }

        // 身份映射所有硬件中断；非特权域没有GSI空间，同样走身份映射
        let irq = if gsi.data() < self.irq_core.nr_hw_irqs() || !self.hv.is_initial_domain() {
            let irq = IrqNumber::new(gsi.data());
            self.irq_core.activate_irq(irq)?;
            irq
        } else {
            self.find_unbound_irq()?
        };

        self.irq_core
            .set_chip_and_handler(irq, self.pirq_chip(), IrqFlowType::FastEoi, name);

        // 只有特权域才能分配vector；非特权域由前端总线代办
        let mut vector = 0;
        if self.hv.is_initial_domain() {
            match self.hv.physdev_op(PhysdevOp::AllocIrqVector { gsi }) {
                Ok(v) => vector = v,
                Err(e) => {
                    warn!(
                        "xen_allocate_pirq: alloc vector for gsi {} failed: {:?}",
                        gsi.data(),
                        e
                    );
                    self.irq_core.release_irq(irq);
                    return Err(SystemError::ENOSPC);
                }
            }
        }

        let mut flags = PirqFlags::empty();
        if shareable {
            flags.insert(PirqFlags::SHAREABLE);
        }
        self.irq_info[irq.data() as usize].fill(
            XenIrqType::Pirq,
            EventChannelPort::INVALID,
            ProcessorId::new(0),
            IrqPayload::Pirq(PirqInfo {
                gsi,
                vector,
                flags,
                domid: DomainId::SELF,
            }),
        );

        return Ok(irq);
    }

    /// 销毁一个pass-through中断
    pub fn xen_destroy_irq(&self, irq: IrqNumber) -> Result<(), SystemError> {
        let _inner = self.inner.lock_irqsave();

        if self.irq_core.chip_of(irq).is_none() {
            return Err(SystemError::ENOENT);
        }
        let info = self.info_for_irq(irq).ok_or(SystemError::ENOENT)?;
        let pirq = info.pirq().ok_or(SystemError::ENOENT)?;

        if self.hv.is_initial_domain() {
            if let Err(e) = self.hv.physdev_op(PhysdevOp::UnmapPirq {
                domid: pirq.domid,
                pirq: pirq.gsi,
            }) {
                warn!("unmap irq {} failed: {:?}", irq.data(), e);
                return Err(e);
            }
        }

        info.reset();
        self.irq_core.release_irq(irq);

        return Ok(());
    }

    /// 将一条MSI映射为pass-through中断
    ///
    /// 总线位置与表项由调用者发现并通过`map`传入。
    pub fn xen_map_pirq_msi(
        &self,
        domid: DomainId,
        map: PhysdevMapPirq,
    ) -> Result<IrqNumber, SystemError> {
        let _inner = self.inner.lock_irqsave();

        let irq = self.find_unbound_irq()?;

        let pirq = match self.hv.physdev_op(PhysdevOp::MapPirq { domid, map }) {
            Ok(pirq) => pirq,
            Err(e) => {
                warn!("xen map irq failed: {:?}", e);
                self.irq_core.release_irq(irq);
                return Err(e);
            }
        };

        self.irq_info[irq.data() as usize].fill(
            XenIrqType::Pirq,
            EventChannelPort::INVALID,
            ProcessorId::new(0),
            IrqPayload::Pirq(PirqInfo {
                gsi: GsiNumber::new(pirq),
                vector: 0,
                flags: PirqFlags::empty(),
                domid,
            }),
        );

        self.irq_core.set_chip_and_handler(
            irq,
            self.pirq_chip(),
            IrqFlowType::FastEoi,
            if map.msix { "msi-x" } else { "msi" },
        );

        return Ok(irq);
    }

    /// 解除一个IRQ的事件通道绑定
    pub fn unbind_from_irq(&self, irq: IrqNumber) {
        let mut inner = self.inner.lock_irqsave();

        let info = match self.info_for_irq(irq) {
            Some(info) => info,
            None => return,
        };

        let evtchn = info.evtchn();
        if evtchn.is_valid() {
            if self
                .hv
                .event_channel_op(EventChannelOp::Close { port: evtchn })
                .is_err()
            {
                panic!("Failed to close event channel {}", evtchn.data());
            }

            let cpu = info.cpu();
            match info.irq_type() {
                XenIrqType::Virq => {
                    if let Some(virq) = info.virq() {
                        inner.virq_to_irq[cpu.data() as usize][virq.data() as usize] = None;
                    }
                }
                XenIrqType::Ipi => {
                    if let Some(ipi) = info.ipi() {
                        inner.ipi_to_irq[cpu.data() as usize][ipi.data() as usize] = None;
                    }
                }
                _ => {}
            }

            // 关闭的端口会被hypervisor隐式地重新归属到VCPU0
            self.do_bind_evtchn_to_cpu(&inner, evtchn, ProcessorId::new(0));

            self.port_table.clear_irq_mapping(evtchn);
        }

        if info.irq_type() != XenIrqType::Unbound {
            info.reset();
            self.irq_core.release_irq(irq);
        }
    }

    /// 把端口的投递目标改为指定CPU
    ///
    /// 调用者必须持有全局映射锁。
    pub(super) fn do_bind_evtchn_to_cpu(
        &self,
        _inner: &SpinLockGuard<'_, InnerEvtchnManager>,
        evtchn: EventChannelPort,
        cpu: ProcessorId,
    ) {
        let irq = match self.port_table.lookup_irq(evtchn) {
            Some(irq) => irq,
            None => return,
        };
        let info = &self.irq_info[irq.data() as usize];

        self.irq_core.desc_set_affinity(irq, &CpuMask::single(cpu));

        self.port_table.move_port_cpu(evtchn, info.cpu(), cpu);
        info.set_cpu(cpu);
    }

    /// 绑定域间端口并注册处理程序
    pub fn bind_evtchn_to_irqhandler(
        &self,
        evtchn: EventChannelPort,
        handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        name: &'static str,
        dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqNumber, SystemError> {
        let irq = self.bind_evtchn_to_irq(evtchn)?;
        if let Err(e) = self
            .irq_core
            .request_irq(irq, name.to_string(), handler, flags, dev_id)
        {
            self.unbind_from_irq(irq);
            return Err(e);
        }
        return Ok(irq);
    }

    /// 建立域间通道并注册处理程序
    pub fn bind_interdomain_evtchn_to_irqhandler(
        &self,
        remote_domain: DomainId,
        remote_port: EventChannelPort,
        handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        name: &'static str,
        dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqNumber, SystemError> {
        let irq = self.bind_interdomain_evtchn_to_irq(remote_domain, remote_port)?;
        if let Err(e) = self
            .irq_core
            .request_irq(irq, name.to_string(), handler, flags, dev_id)
        {
            self.unbind_from_irq(irq);
            return Err(e);
        }
        return Ok(irq);
    }

    /// 绑定VIRQ并注册处理程序
    pub fn bind_virq_to_irqhandler(
        &self,
        virq: VirqNumber,
        cpu: ProcessorId,
        handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        name: &'static str,
        dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqNumber, SystemError> {
        let irq = self.bind_virq_to_irq(virq, cpu)?;
        if let Err(e) = self
            .irq_core
            .request_irq(irq, name.to_string(), handler, flags, dev_id)
        {
            self.unbind_from_irq(irq);
            return Err(e);
        }
        return Ok(irq);
    }

    /// 绑定IPI通道并注册处理程序
    pub fn bind_ipi_to_irqhandler(
        &self,
        ipi: IpiVector,
        cpu: ProcessorId,
        handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        name: &'static str,
        dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqNumber, SystemError> {
        let irq = self.bind_ipi_to_irq(ipi, cpu)?;

        let flags = flags
            | IrqHandleFlags::IRQF_NO_SUSPEND
            | IrqHandleFlags::IRQF_FORCE_RESUME
            | IrqHandleFlags::IRQF_EARLY_RESUME;
        if let Err(e) = self
            .irq_core
            .request_irq(irq, name.to_string(), handler, flags, dev_id)
        {
            self.unbind_from_irq(irq);
            return Err(e);
        }
        return Ok(irq);
    }

    /// 注销处理程序并解除绑定
    pub fn unbind_from_irqhandler(&self, irq: IrqNumber, dev_id: Option<Arc<dyn IrqHandlerData>>) {
        self.irq_core.free_irq(irq, dev_id);
        self.unbind_from_irq(irq);
    }

    /// 通过IRQ向通道远端发送通知；端口无效时静默丢弃
    pub fn notify_remote_via_irq(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            self.hv
                .event_channel_op(EventChannelOp::Send { port: evtchn })
                .ok();
        }
    }

    /// 向指定CPU发送一个事件通道IPI
    pub fn xen_send_ipi_one(
        &self,
        cpu: ProcessorId,
        vector: IpiVector,
    ) -> Result<(), SystemError> {
        if cpu.data() >= self.nr_cpus || vector.data() as usize >= NR_IPIS {
            return Err(SystemError::EINVAL);
        }
        let irq = {
            let inner = self.inner.lock_irqsave();
            inner.ipi_to_irq[cpu.data() as usize][vector.data() as usize]
        };
        let irq = irq.ok_or(SystemError::EINVAL)?;
        self.notify_remote_via_irq(irq);
        return Ok(());
    }

    /// 把一个（重新建立的）域间端口接回既有的IRQ
    ///
    /// 用于save/restore之后由上层重建的域间通道：恢复后所有
    /// 端口映射都已被清空，但IRQ及其注册的处理程序仍然存在。
    pub fn rebind_evtchn_irq(&self, evtchn: EventChannelPort, irq: IrqNumber) {
        // 切换期间irq保持屏蔽，新的端口默认也是屏蔽的
        self.irq_core.disable_irq(irq);

        {
            let _inner = self.inner.lock_irqsave();

            debug_assert!(self.port_table.lookup_irq(evtchn).is_none());
            debug_assert!(
                self.irq_info[irq.data() as usize].irq_type() != XenIrqType::Unbound
            );

            self.irq_info[irq.data() as usize].fill(
                XenIrqType::Evtchn,
                evtchn,
                ProcessorId::new(0),
                IrqPayload::None,
            );
            self.port_table.set_irq_mapping(evtchn, irq);
        }

        // 新的事件通道总是绑定在CPU0上
        self.set_affinity_irq(irq, &EVTCHN_DEFAULT_AFFINITY).ok();

        // 解除端口屏蔽
        self.irq_core.enable_irq(irq);
    }

    /// 检查物理中断线是否与其他域共享
    pub fn xen_ignore_irq(&self, irq: IrqNumber) -> bool {
        use crate::hypercall::XenIrqStatus;

        let pirq = match self.info_for_irq(irq).and_then(|info| info.pirq()) {
            Some(pirq) => pirq,
            None => return false,
        };
        match self
            .hv
            .physdev_op(PhysdevOp::IrqStatusQuery { gsi: pirq.gsi })
        {
            Ok(raw) => !XenIrqStatus::from_bits_truncate(raw).contains(XenIrqStatus::SHARED),
            Err(_) => false,
        }
    }

    /// 设置事件通道上行调用的投递方式
    pub fn set_callback_via(&self, via: u64) -> Result<(), SystemError> {
        return self.hv.hvm_set_param(HvmParam::CallbackIrq, via);
    }
}
