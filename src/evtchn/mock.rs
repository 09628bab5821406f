//! 测试用的collaborator实现

use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use system_error::SystemError;

use crate::hypercall::{
    EventChannelOp, HvmParam, HypervisorOps, PhysdevOp,
};
use crate::irqcore::{
    IrqCoreOps, IrqFlowType, IrqHandleFlags, IrqHandler, IrqHandlerData, IrqNumber, IrqReturn,
};
use crate::irqchip::IrqChip;
use crate::libs::cpumask::CpuMask;
use crate::libs::spinlock::SpinLock;
use crate::smp::{AtomicProcessorId, ProcessorId};

use super::manage::EvtchnManager;
use super::EventChannelPort;

/// 脚本化的hypervisor
///
/// bind类操作按种类从预先灌入的端口队列弹出结果；队列为空时从
/// `next_port`开始顺序分配。所有调用都被记录下来供断言使用。
#[derive(Debug)]
pub(crate) struct MockHypervisor {
    pub evtchn_calls: SpinLock<Vec<EventChannelOp>>,
    pub physdev_calls: SpinLock<Vec<PhysdevOp>>,
    pub sched_polls: SpinLock<Vec<(EventChannelPort, u64)>>,
    pub hvm_params: SpinLock<Vec<(HvmParam, u64)>>,

    pub virq_ports: SpinLock<VecDeque<u32>>,
    pub ipi_ports: SpinLock<VecDeque<u32>>,
    pub interdomain_ports: SpinLock<VecDeque<u32>>,
    pub pirq_ports: SpinLock<VecDeque<u32>>,
    next_port: SpinLock<u32>,

    pub bind_virq_error: SpinLock<Option<SystemError>>,
    pub bind_pirq_error: SpinLock<Option<SystemError>>,
    pub bind_vcpu_error: SpinLock<Option<SystemError>>,
    pub alloc_vector_error: SpinLock<Option<SystemError>>,

    /// IrqStatusQuery的应答：gsi → 原始状态位
    pub irq_status: SpinLock<BTreeMap<u32, u32>>,
    /// PirqEoiGmfn是否注册成功
    pub pirq_eoi_gmfn_ok: bool,
    pub initial_domain: bool,
}

impl MockHypervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            evtchn_calls: SpinLock::new(Vec::new()),
            physdev_calls: SpinLock::new(Vec::new()),
            sched_polls: SpinLock::new(Vec::new()),
            hvm_params: SpinLock::new(Vec::new()),
            virq_ports: SpinLock::new(VecDeque::new()),
            ipi_ports: SpinLock::new(VecDeque::new()),
            interdomain_ports: SpinLock::new(VecDeque::new()),
            pirq_ports: SpinLock::new(VecDeque::new()),
            next_port: SpinLock::new(32),
            bind_virq_error: SpinLock::new(None),
            bind_pirq_error: SpinLock::new(None),
            bind_vcpu_error: SpinLock::new(None),
            alloc_vector_error: SpinLock::new(None),
            irq_status: SpinLock::new(BTreeMap::new()),
            pirq_eoi_gmfn_ok: false,
            initial_domain: true,
        })
    }

    pub fn with_eoi_gmfn() -> Arc<Self> {
        let mut hv = Self::new();
        Arc::get_mut(&mut hv).unwrap().pirq_eoi_gmfn_ok = true;
        hv
    }

    fn alloc_port(&self, queue: &SpinLock<VecDeque<u32>>) -> EventChannelPort {
        if let Some(port) = queue.lock().pop_front() {
            return EventChannelPort::new(port);
        }
        let mut next = self.next_port.lock();
        let port = *next;
        *next += 1;
        EventChannelPort::new(port)
    }

    /// 统计指定操作出现的次数
    pub fn count_evtchn_calls(&self, pred: impl Fn(&EventChannelOp) -> bool) -> usize {
        self.evtchn_calls.lock().iter().filter(|op| pred(op)).count()
    }
}

impl HypervisorOps for MockHypervisor {
    fn event_channel_op(&self, op: EventChannelOp) -> Result<EventChannelPort, SystemError> {
        self.evtchn_calls.lock().push(op);
        match op {
            EventChannelOp::BindVirq { .. } => {
                if let Some(e) = self.bind_virq_error.lock().clone() {
                    return Err(e);
                }
                Ok(self.alloc_port(&self.virq_ports))
            }
            EventChannelOp::BindIpi { .. } => Ok(self.alloc_port(&self.ipi_ports)),
            EventChannelOp::BindInterdomain { .. } => Ok(self.alloc_port(&self.interdomain_ports)),
            EventChannelOp::BindPirq { .. } => {
                if let Some(e) = self.bind_pirq_error.lock().clone() {
                    return Err(e);
                }
                Ok(self.alloc_port(&self.pirq_ports))
            }
            EventChannelOp::BindVcpu { .. } => {
                if let Some(e) = self.bind_vcpu_error.lock().clone() {
                    return Err(e);
                }
                Ok(EventChannelPort::INVALID)
            }
            EventChannelOp::Close { .. }
            | EventChannelOp::Unmask { .. }
            | EventChannelOp::Send { .. } => Ok(EventChannelPort::INVALID),
        }
    }

    fn physdev_op(&self, op: PhysdevOp) -> Result<u32, SystemError> {
        self.physdev_calls.lock().push(op);
        match op {
            PhysdevOp::Eoi { .. } => Ok(0),
            PhysdevOp::AllocIrqVector { gsi } => {
                if let Some(e) = self.alloc_vector_error.lock().clone() {
                    return Err(e);
                }
                // vector与gsi保持可预测的关系
                Ok(gsi.data() + 0x30)
            }
            PhysdevOp::MapPirq { .. } => Ok(40),
            PhysdevOp::UnmapPirq { .. } => Ok(0),
            PhysdevOp::IrqStatusQuery { gsi } => {
                Ok(self.irq_status.lock().get(&gsi.data()).copied().unwrap_or(0))
            }
            PhysdevOp::PirqEoiGmfn { .. } => {
                if self.pirq_eoi_gmfn_ok {
                    Ok(0)
                } else {
                    Err(SystemError::ENOSYS)
                }
            }
        }
    }

    fn sched_poll(&self, port: EventChannelPort, timeout_ns: u64) -> Result<(), SystemError> {
        self.sched_polls.lock().push((port, timeout_ns));
        Ok(())
    }

    fn hvm_set_param(&self, param: HvmParam, value: u64) -> Result<(), SystemError> {
        self.hvm_params.lock().push((param, value));
        Ok(())
    }

    fn is_initial_domain(&self) -> bool {
        self.initial_domain
    }
}

/// 宿主中断核心的替身
#[derive(Debug)]
pub(crate) struct MockIrqDesc {
    pub chip: Option<Arc<dyn IrqChip>>,
    pub name: &'static str,
    pub flow: Option<IrqFlowType>,
    pub action: Option<(String, IrqHandleFlags)>,
    pub disabled: bool,
    pub pending: bool,
    pub affinity: Option<CpuMask>,
    pub moved: u32,
}

impl MockIrqDesc {
    fn new() -> Self {
        Self {
            chip: None,
            name: "",
            flow: None,
            action: None,
            disabled: true,
            pending: false,
            affinity: None,
            moved: 0,
        }
    }
}

type DispatchHook = alloc::boxed::Box<dyn Fn(IrqNumber) + Send + Sync>;

pub(crate) struct MockIrqCore {
    nr_irqs: u32,
    nr_hw_irqs: u32,
    nr_cpus: u32,
    current_cpu: AtomicProcessorId,
    pub descs: SpinLock<BTreeMap<u32, MockIrqDesc>>,
    pub dispatched: SpinLock<Vec<IrqNumber>>,
    pub request_error: SpinLock<Option<SystemError>>,
    /// 每次dispatch后调用，用来在扫描期间注入新事件
    pub dispatch_hook: SpinLock<Option<DispatchHook>>,
}

impl core::fmt::Debug for MockIrqCore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("MockIrqCore")
    }
}

impl MockIrqCore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            nr_irqs: 64,
            nr_hw_irqs: 16,
            nr_cpus: 4,
            current_cpu: AtomicProcessorId::default(),
            descs: SpinLock::new(BTreeMap::new()),
            dispatched: SpinLock::new(Vec::new()),
            request_error: SpinLock::new(None),
            dispatch_hook: SpinLock::new(None),
        })
    }

    pub fn set_current_cpu(&self, cpu: ProcessorId) {
        self.current_cpu
            .store(cpu, core::sync::atomic::Ordering::SeqCst);
    }

    pub fn take_dispatched(&self) -> Vec<IrqNumber> {
        core::mem::take(&mut *self.dispatched.lock())
    }

    pub fn set_pending(&self, irq: IrqNumber, value: bool) {
        if let Some(desc) = self.descs.lock().get_mut(&irq.data()) {
            desc.pending = value;
        }
    }
}

impl IrqCoreOps for MockIrqCore {
    fn nr_irqs(&self) -> u32 {
        self.nr_irqs
    }

    fn nr_hw_irqs(&self) -> u32 {
        self.nr_hw_irqs
    }

    fn possible_cpus(&self) -> u32 {
        self.nr_cpus
    }

    fn current_cpu(&self) -> ProcessorId {
        self.current_cpu.load(core::sync::atomic::Ordering::SeqCst)
    }

    fn activate_irq(&self, irq: IrqNumber) -> Result<(), SystemError> {
        if irq.data() >= self.nr_irqs {
            return Err(SystemError::EINVAL);
        }
        self.descs
            .lock()
            .entry(irq.data())
            .or_insert_with(MockIrqDesc::new);
        Ok(())
    }

    fn release_irq(&self, irq: IrqNumber) {
        if let Some(desc) = self.descs.lock().get_mut(&irq.data()) {
            desc.chip = None;
            desc.flow = None;
            desc.name = "";
            desc.action = None;
            desc.disabled = true;
        }
    }

    fn set_chip_and_handler(
        &self,
        irq: IrqNumber,
        chip: Arc<dyn IrqChip>,
        flow: IrqFlowType,
        name: &'static str,
    ) {
        let mut descs = self.descs.lock();
        let desc = descs.entry(irq.data()).or_insert_with(MockIrqDesc::new);
        desc.chip = Some(chip);
        desc.flow = Some(flow);
        desc.name = name;
    }

    fn chip_of(&self, irq: IrqNumber) -> Option<Arc<dyn IrqChip>> {
        self.descs
            .lock()
            .get(&irq.data())
            .and_then(|desc| desc.chip.clone())
    }

    fn request_irq(
        &self,
        irq: IrqNumber,
        name: String,
        _handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        _dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<(), SystemError> {
        if let Some(e) = self.request_error.lock().clone() {
            return Err(e);
        }

        let chip = {
            let mut descs = self.descs.lock();
            let desc = descs.get_mut(&irq.data()).ok_or(SystemError::EINVAL)?;
            if desc.chip.is_none() {
                return Err(SystemError::ENOSYS);
            }
            if desc.action.is_some() && !flags.contains(IrqHandleFlags::IRQF_SHARED) {
                return Err(SystemError::EBUSY);
            }
            desc.action = Some((name, flags));
            desc.disabled = false;
            desc.chip.clone()
        };

        // 锁已释放，startup回调可以安全地回到本mock
        if let Some(chip) = chip {
            if chip.irq_startup(irq) == Err(SystemError::ENOSYS) {
                chip.irq_enable(irq).ok();
            }
        }
        Ok(())
    }

    fn free_irq(&self, irq: IrqNumber, _dev_id: Option<Arc<dyn IrqHandlerData>>) {
        let chip = {
            let mut descs = self.descs.lock();
            let desc = match descs.get_mut(&irq.data()) {
                Some(desc) => desc,
                None => return,
            };
            desc.action = None;
            desc.disabled = true;
            desc.chip.clone()
        };
        if let Some(chip) = chip {
            chip.irq_shutdown(irq);
        }
    }

    fn has_action(&self, irq: IrqNumber) -> bool {
        self.descs
            .lock()
            .get(&irq.data())
            .map(|desc| desc.action.is_some())
            .unwrap_or(false)
    }

    fn irq_flags(&self, irq: IrqNumber) -> Option<IrqHandleFlags> {
        self.descs
            .lock()
            .get(&irq.data())
            .and_then(|desc| desc.action.as_ref().map(|(_, flags)| *flags))
    }

    fn is_disabled(&self, irq: IrqNumber) -> bool {
        self.descs
            .lock()
            .get(&irq.data())
            .map(|desc| desc.disabled)
            .unwrap_or(true)
    }

    fn is_pending(&self, irq: IrqNumber) -> bool {
        self.descs
            .lock()
            .get(&irq.data())
            .map(|desc| desc.pending)
            .unwrap_or(false)
    }

    fn irq_move_masked(&self, irq: IrqNumber) {
        if let Some(desc) = self.descs.lock().get_mut(&irq.data()) {
            desc.moved += 1;
        }
    }

    fn desc_set_affinity(&self, irq: IrqNumber, mask: &CpuMask) {
        if let Some(desc) = self.descs.lock().get_mut(&irq.data()) {
            desc.affinity = Some(mask.clone());
        }
    }

    fn disable_irq(&self, irq: IrqNumber) {
        let chip = {
            let mut descs = self.descs.lock();
            let desc = match descs.get_mut(&irq.data()) {
                Some(desc) => desc,
                None => return,
            };
            desc.disabled = true;
            desc.chip.clone()
        };
        if let Some(chip) = chip {
            chip.irq_disable(irq);
        }
    }

    fn enable_irq(&self, irq: IrqNumber) {
        let chip = {
            let mut descs = self.descs.lock();
            let desc = match descs.get_mut(&irq.data()) {
                Some(desc) => desc,
                None => return,
            };
            desc.disabled = false;
            desc.chip.clone()
        };
        if let Some(chip) = chip {
            if chip.irq_enable(irq) == Err(SystemError::ENOSYS) {
                chip.irq_unmask(irq).ok();
            }
        }
    }

    fn dispatch(&self, irq: IrqNumber) -> Result<IrqReturn, SystemError> {
        self.dispatched.lock().push(irq);
        let hook = self.dispatch_hook.lock().take();
        if let Some(hook) = hook {
            hook(irq);
        }
        Ok(IrqReturn::Handled)
    }
}

/// 永远报告"已处理"的空处理程序
#[derive(Debug)]
pub(crate) struct NoopHandler;

impl IrqHandler for NoopHandler {
    fn handle(
        &self,
        _irq: IrqNumber,
        _dynamic_data: Option<&Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqReturn, SystemError> {
        Ok(IrqReturn::Handled)
    }
}

pub(crate) static NOOP_HANDLER: NoopHandler = NoopHandler;

/// 建好一套由mock collaborator支撑的管理器
pub(crate) fn build_manager() -> (
    Arc<EvtchnManager>,
    Arc<MockHypervisor>,
    Arc<MockIrqCore>,
) {
    let hv = MockHypervisor::new();
    let irq_core = MockIrqCore::new();
    let manager = EvtchnManager::new(hv.clone(), irq_core.clone());
    (manager, hv, irq_core)
}
