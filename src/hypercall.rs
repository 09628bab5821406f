use core::fmt::Debug;

use system_error::SystemError;

use crate::evtchn::{EventChannelPort, IpiVector, VirqNumber};
use crate::smp::ProcessorId;

// 全局系统中断号（固件视角的物理中断线编号）
int_like!(GsiNumber, u32);

// 域编号
int_like!(DomainId, u16);

impl DomainId {
    /// 指代当前域自身
    pub const SELF: DomainId = DomainId::new(0x7ff0);
}

bitflags! {
    /// `PhysdevOp::IrqStatusQuery`返回的状态位
    pub struct XenIrqStatus: u32 {
        /// 该GSI在中断结束时需要显式地通知hypervisor（EOI）
        const NEEDS_EOI = 1 << 0;
        /// 该GSI与其他域共享
        const SHARED = 1 << 1;
    }
}

bitflags! {
    /// `EventChannelOp::BindPirq`的标志位
    pub struct BindPirqFlags: u32 {
        /// 愿意与其他域共享这条物理中断线
        const WILL_SHARE = 1 << 0;
    }
}

/// 事件通道操作（EVTCHNOP_*）
///
/// 各操作的语义与Xen ABI逐位一致，具体的调用编码由实现方负责。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventChannelOp {
    /// 与远端域的指定端口建立一条域间通道，返回本地端口
    BindInterdomain {
        remote_dom: DomainId,
        remote_port: EventChannelPort,
    },
    /// 将虚拟中断绑定到指定VCPU，返回新分配的端口
    BindVirq {
        virq: VirqNumber,
        vcpu: ProcessorId,
    },
    /// 为指定VCPU分配一个IPI端口
    BindIpi { vcpu: ProcessorId },
    /// 将物理中断线绑定为事件通道，返回新分配的端口
    BindPirq {
        pirq: GsiNumber,
        flags: BindPirqFlags,
    },
    /// 修改端口的投递VCPU
    BindVcpu {
        port: EventChannelPort,
        vcpu: ProcessorId,
    },
    /// 关闭端口
    Close { port: EventChannelPort },
    /// 解除端口屏蔽（由hypervisor在正确的VCPU上补发selector位）
    Unmask { port: EventChannelPort },
    /// 向通道的远端发送通知
    Send { port: EventChannelPort },
}

/// `PhysdevOp::MapPirq`的MSI参数
///
/// 总线位置与表项由调用者负责发现，这里只携带映射所需的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysdevMapPirq {
    pub bus: u8,
    pub devfn: u8,
    pub entry_nr: u16,
    pub table_base: u64,
    pub msix: bool,
}

/// 物理设备操作（PHYSDEVOP_*）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysdevOp {
    /// 物理中断线的中断结束通知
    Eoi { gsi: GsiNumber },
    /// 为GSI分配中断向量，返回vector（仅特权域）
    AllocIrqVector { gsi: GsiNumber },
    /// 将MSI映射为pirq，返回pirq编号（仅特权域）
    MapPirq {
        domid: DomainId,
        map: PhysdevMapPirq,
    },
    /// 解除pirq映射（仅特权域）
    UnmapPirq { domid: DomainId, pirq: GsiNumber },
    /// 查询GSI的状态，返回`XenIrqStatus`位
    IrqStatusQuery { gsi: GsiNumber },
    /// 注册"哪些pirq需要EOI"的共享位图页
    PirqEoiGmfn { gmfn: u64 },
}

/// HVM参数（HVMOP_set_param）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvmParam {
    /// 事件通道上行调用的投递方式（向量或PCI中断）
    CallbackIrq,
}

/// hypercall的抽象接口
///
/// 每个操作失败时返回对应的错误码，语义与Xen ABI一致；
/// 具体的hypercall指令序列与参数封送由实现方（体系结构层）完成。
pub trait HypervisorOps: Debug + Send + Sync {
    /// 事件通道hypercall。
    ///
    /// bind类操作成功时返回新的本地端口；
    /// 其余操作成功时返回`EventChannelPort::INVALID`。
    fn event_channel_op(&self, op: EventChannelOp) -> Result<EventChannelPort, SystemError>;

    /// 物理设备hypercall。
    ///
    /// `AllocIrqVector`返回vector，`MapPirq`返回pirq编号，
    /// `IrqStatusQuery`返回`XenIrqStatus`的原始位，其余操作返回0。
    fn physdev_op(&self, op: PhysdevOp) -> Result<u32, SystemError>;

    /// SCHEDOP_poll：阻塞当前VCPU，直到端口变为pending或超时。
    ///
    /// `timeout_ns`为绝对超时时间，0表示无限等待。
    fn sched_poll(&self, port: EventChannelPort, timeout_ns: u64) -> Result<(), SystemError>;

    /// HVMOP_set_param
    fn hvm_set_param(&self, param: HvmParam, value: u64) -> Result<(), SystemError>;

    /// 当前guest是否为特权域（dom0）
    fn is_initial_domain(&self) -> bool;
}
