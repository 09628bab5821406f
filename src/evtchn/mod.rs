//! Xen事件通道子系统
//!
//! Xen用抽象的事件通道来建模中断：每个域拥有`NR_EVENT_CHANNELS`个
//! 事件通道端口，而宿主的IRQ号远少于这个数量，因此端口与IRQ之间
//! 需要动态建立双向映射。事件通道通过定义中断芯片与宿主的中断
//! 子系统衔接：收到事件后，端口被映射为IRQ并送入常规的中断分发
//! 路径。
//!
//! 可以映射到事件通道的事件共有四种：
//!
//! 1. 域间通知。所有虚拟设备事件都属于此类，它们由另一个域
//!    （通常是dom0）中的前端驱动；
//! 2. VIRQ，典型用途是定时器，是每CPU的事件；
//! 3. IPI；
//! 4. PIRQ，即透传的物理硬件中断。

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::sync::Arc;

use atomic_enum::atomic_enum;
use system_error::SystemError;

use crate::hypercall::{DomainId, GsiNumber, HypervisorOps, PhysdevMapPirq};
use crate::irqcore::{IrqCoreOps, IrqHandleFlags, IrqHandler, IrqHandlerData, IrqNumber};
use crate::libs::spinlock::SpinLock;
use crate::smp::{AtomicProcessorId, ProcessorId};

pub mod chip;
pub mod manage;
pub mod poll;
pub mod porttable;
pub mod resume;
pub mod shared;
pub mod upcall;

#[cfg(test)]
pub(crate) mod mock;

pub use manage::EvtchnManager;

/// 事件通道端口总数（必须是机器字长的整数倍）
pub const NR_EVENT_CHANNELS: usize = 1024;
/// 位图中一个字的位数
pub const EVTCHN_WORD_BITS: usize = usize::BITS as usize;
/// 底层pending位图的字数
pub const NR_EVENT_WORDS: usize = NR_EVENT_CHANNELS / EVTCHN_WORD_BITS;
/// 每个CPU可绑定的VIRQ数量
pub const NR_VIRQS: usize = 24;
/// 每个CPU可绑定的IPI向量数量
pub const NR_IPIS: usize = 8;

// 事件通道端口号
int_like!(EventChannelPort, AtomicEventChannelPort, u32, AtomicU32);

impl EventChannelPort {
    /// hypervisor永远不会把0号端口分配给任何用途
    pub const INVALID: EventChannelPort = EventChannelPort::new(0);

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// 端口在两级位图中所属的字
    #[inline]
    pub(crate) fn word_index(&self) -> usize {
        self.0 as usize / EVTCHN_WORD_BITS
    }
}

// 虚拟中断号（hypervisor产生的每CPU事件）
int_like!(VirqNumber, u32);

impl VirqNumber {
    pub const TIMER: VirqNumber = VirqNumber::new(0);
    pub const DEBUG: VirqNumber = VirqNumber::new(1);
    pub const CONSOLE: VirqNumber = VirqNumber::new(2);
    pub const DOM_EXC: VirqNumber = VirqNumber::new(3);
}

// 通过事件通道投递的IPI向量
int_like!(IpiVector, u32);

impl IpiVector {
    pub const RESCHEDULE: IpiVector = IpiVector::new(0);
    pub const CALL_FUNCTION: IpiVector = IpiVector::new(1);
    pub const CALL_FUNCTION_SINGLE: IpiVector = IpiVector::new(2);
}

/// 中断的绑定类型
#[atomic_enum]
#[derive(PartialEq, Eq)]
pub enum XenIrqType {
    Unbound = 0,
    Pirq,
    Virq,
    Ipi,
    Evtchn,
}

bitflags! {
    /// pirq绑定的标志位
    pub struct PirqFlags: u16 {
        /// 允许与其他域共享该物理中断线
        const SHAREABLE = 1 << 1;
    }
}

/// pirq的类型特定信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PirqInfo {
    pub gsi: GsiNumber,
    pub vector: u32,
    pub flags: PirqFlags,
    pub domid: DomainId,
}

/// 与绑定类型相关的负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqPayload {
    None,
    Virq(VirqNumber),
    Ipi(IpiVector),
    Pirq(PirqInfo),
}

/// 每个IRQ一份的打包绑定信息
///
/// 热路径（上行调用分发、屏蔽/解除屏蔽）只读取扁平的原子字段，
/// 负载部分由每IRQ的自旋锁保护，仅在绑定、恢复等慢路径上访问。
///
/// 写入者先写负载与cpu、再写类型、最后以Release发布端口号；
/// 无锁读者以Acquire读取端口号，因此不会观察到半更新的记录。
pub struct IrqInfo {
    ty: AtomicXenIrqType,
    evtchn: AtomicEventChannelPort,
    cpu: AtomicProcessorId,
    payload: SpinLock<IrqPayload>,
}

impl core::fmt::Debug for IrqInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IrqInfo")
            .field("type", &self.irq_type())
            .field("evtchn", &self.evtchn())
            .field("cpu", &self.cpu())
            .finish()
    }
}

impl IrqInfo {
    pub(crate) fn new() -> Self {
        Self {
            ty: AtomicXenIrqType::new(XenIrqType::Unbound),
            evtchn: AtomicEventChannelPort::default(),
            cpu: AtomicProcessorId::default(),
            payload: SpinLock::new(IrqPayload::None),
        }
    }

    #[inline]
    pub fn irq_type(&self) -> XenIrqType {
        self.ty.load(Ordering::Acquire)
    }

    #[inline]
    pub fn evtchn(&self) -> EventChannelPort {
        self.evtchn.load(Ordering::Acquire)
    }

    #[inline]
    pub fn cpu(&self) -> ProcessorId {
        self.cpu.load(Ordering::Acquire)
    }

    pub fn virq(&self) -> Option<VirqNumber> {
        match *self.payload.lock_irqsave() {
            IrqPayload::Virq(virq) => Some(virq),
            _ => None,
        }
    }

    pub fn ipi(&self) -> Option<IpiVector> {
        match *self.payload.lock_irqsave() {
            IrqPayload::Ipi(ipi) => Some(ipi),
            _ => None,
        }
    }

    pub fn pirq(&self) -> Option<PirqInfo> {
        match *self.payload.lock_irqsave() {
            IrqPayload::Pirq(pirq) => Some(pirq),
            _ => None,
        }
    }

    /// 建立一条新的绑定记录
    pub(crate) fn fill(
        &self,
        ty: XenIrqType,
        evtchn: EventChannelPort,
        cpu: ProcessorId,
        payload: IrqPayload,
    ) {
        *self.payload.lock_irqsave() = payload;
        self.cpu.store(cpu, Ordering::Release);
        self.ty.store(ty, Ordering::Release);
        // 端口号最后发布，读者以此判断记录是否生效
        self.evtchn.store(evtchn, Ordering::Release);
    }

    /// 将记录重置为未绑定状态
    pub(crate) fn reset(&self) {
        self.evtchn
            .store(EventChannelPort::INVALID, Ordering::Release);
        self.ty.store(XenIrqType::Unbound, Ordering::Release);
        self.cpu.store(ProcessorId::new(0), Ordering::Release);
        *self.payload.lock_irqsave() = IrqPayload::None;
    }

    pub(crate) fn set_cpu(&self, cpu: ProcessorId) {
        self.cpu.store(cpu, Ordering::Release);
    }

    pub(crate) fn set_evtchn(&self, evtchn: EventChannelPort) {
        self.evtchn.store(evtchn, Ordering::Release);
    }
}

static EVTCHN_MANAGER: spin::Once<Arc<EvtchnManager>> = spin::Once::new();

/// 初始化事件通道子系统
///
/// 初始化过程是单线程的，重复调用会返回第一次创建的实例。
#[inline(never)]
pub fn xen_init_irq(
    hv: Arc<dyn HypervisorOps>,
    irq_core: Arc<dyn IrqCoreOps>,
) -> Arc<EvtchnManager> {
    let manager = EVTCHN_MANAGER.call_once(|| EvtchnManager::new(hv, irq_core));
    return manager.clone();
}

/// 获取事件通道管理器
#[inline(always)]
pub fn evtchn_manager() -> Result<&'static Arc<EvtchnManager>, SystemError> {
    EVTCHN_MANAGER.get().ok_or(SystemError::ENODEV)
}

/// 绑定一个域间事件通道端口，并注册处理程序
pub fn bind_evtchn_to_irqhandler(
    evtchn: EventChannelPort,
    handler: &'static dyn IrqHandler,
    flags: IrqHandleFlags,
    name: &'static str,
    dev_id: Option<Arc<dyn IrqHandlerData>>,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.bind_evtchn_to_irqhandler(evtchn, handler, flags, name, dev_id)
}

/// 绑定一个VIRQ到指定CPU，并注册处理程序
pub fn bind_virq_to_irqhandler(
    virq: VirqNumber,
    cpu: ProcessorId,
    handler: &'static dyn IrqHandler,
    flags: IrqHandleFlags,
    name: &'static str,
    dev_id: Option<Arc<dyn IrqHandlerData>>,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.bind_virq_to_irqhandler(virq, cpu, handler, flags, name, dev_id)
}

/// 为指定CPU绑定一个IPI通道，并注册处理程序
pub fn bind_ipi_to_irqhandler(
    ipi: IpiVector,
    cpu: ProcessorId,
    handler: &'static dyn IrqHandler,
    flags: IrqHandleFlags,
    name: &'static str,
    dev_id: Option<Arc<dyn IrqHandlerData>>,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.bind_ipi_to_irqhandler(ipi, cpu, handler, flags, name, dev_id)
}

/// 与远端域的端口建立域间通道，并注册处理程序
pub fn bind_interdomain_evtchn_to_irqhandler(
    remote_domain: DomainId,
    remote_port: EventChannelPort,
    handler: &'static dyn IrqHandler,
    flags: IrqHandleFlags,
    name: &'static str,
    dev_id: Option<Arc<dyn IrqHandlerData>>,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.bind_interdomain_evtchn_to_irqhandler(
        remote_domain,
        remote_port,
        handler,
        flags,
        name,
        dev_id,
    )
}

/// 注销处理程序并解除绑定
pub fn unbind_from_irqhandler(
    irq: IrqNumber,
    dev_id: Option<Arc<dyn IrqHandlerData>>,
) -> Result<(), SystemError> {
    evtchn_manager()?.unbind_from_irqhandler(irq, dev_id);
    Ok(())
}

/// 通过IRQ向事件通道的远端发送通知
///
/// 与直接按端口发送不同，本接口跨suspend/resume仍然安全：
/// 断开的连接上的通知会被静默丢弃。
pub fn notify_remote_via_irq(irq: IrqNumber) -> Result<(), SystemError> {
    evtchn_manager()?.notify_remote_via_irq(irq);
    Ok(())
}

/// 端口→IRQ查询
pub fn irq_from_evtchn(evtchn: EventChannelPort) -> Result<Option<IrqNumber>, SystemError> {
    Ok(evtchn_manager()?.irq_from_evtchn(evtchn))
}

/// 清除IRQ对应端口的pending位
pub fn xen_clear_irq_pending(irq: IrqNumber) -> Result<(), SystemError> {
    evtchn_manager()?.xen_clear_irq_pending(irq);
    Ok(())
}

/// 设置IRQ对应端口的pending位
pub fn xen_set_irq_pending(irq: IrqNumber) -> Result<(), SystemError> {
    evtchn_manager()?.xen_set_irq_pending(irq);
    Ok(())
}

/// 查询IRQ对应端口的pending位
pub fn xen_test_irq_pending(irq: IrqNumber) -> Result<bool, SystemError> {
    Ok(evtchn_manager()?.xen_test_irq_pending(irq))
}

/// 阻塞等待IRQ对应的端口变为pending
pub fn xen_poll_irq(irq: IrqNumber) -> Result<(), SystemError> {
    evtchn_manager()?.xen_poll_irq(irq);
    Ok(())
}

/// 带超时地阻塞等待IRQ对应的端口变为pending
pub fn xen_poll_irq_timeout(irq: IrqNumber, timeout_ns: u64) -> Result<(), SystemError> {
    evtchn_manager()?.xen_poll_irq_timeout(irq, timeout_ns);
    Ok(())
}

/// suspend/resume后重建全部事件通道绑定
pub fn xen_irq_resume() -> Result<(), SystemError> {
    evtchn_manager()?.xen_irq_resume();
    Ok(())
}

/// 事件上行调用入口（由体系结构相关的回调路径调用）
pub fn xen_evtchn_do_upcall() {
    if let Ok(manager) = evtchn_manager() {
        manager.xen_evtchn_do_upcall();
    }
}

/// HVM guest通过callback vector/PCI中断进入的上行调用入口
pub fn xen_hvm_evtchn_do_upcall() {
    xen_evtchn_do_upcall();
}

/// 向指定CPU发送一个事件通道IPI
pub fn xen_send_ipi_one(cpu: ProcessorId, vector: IpiVector) -> Result<(), SystemError> {
    evtchn_manager()?.xen_send_ipi_one(cpu, vector)
}

/// 为GSI分配一个pass-through中断
pub fn xen_allocate_pirq(
    gsi: GsiNumber,
    shareable: bool,
    name: &'static str,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.xen_allocate_pirq(gsi, shareable, name)
}

/// 销毁一个pass-through中断
pub fn xen_destroy_irq(irq: IrqNumber) -> Result<(), SystemError> {
    evtchn_manager()?.xen_destroy_irq(irq)
}

/// 将一条MSI映射为pass-through中断
pub fn xen_map_pirq_msi(
    domid: DomainId,
    map: PhysdevMapPirq,
) -> Result<IrqNumber, SystemError> {
    evtchn_manager()?.xen_map_pirq_msi(domid, map)
}

/// 设置事件通道上行调用的投递方式
pub fn xen_set_callback_via(via: u64) -> Result<(), SystemError> {
    evtchn_manager()?.set_callback_via(via)
}
