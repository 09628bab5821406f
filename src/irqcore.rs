use core::any::Any;
use core::fmt::Debug;

use alloc::string::String;
use alloc::sync::Arc;

use system_error::SystemError;

use crate::irqchip::IrqChip;
use crate::libs::cpumask::CpuMask;
use crate::smp::ProcessorId;

// 中断号
// 用于表示软件逻辑视角的中断号，全局唯一
int_like!(IrqNumber, u32);

/// 中断处理函数返回值
///
/// 用于指示中断处理函数是否处理了中断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// 中断未被处理
    NotHandled,
    /// 中断已被处理
    Handled,
}

/// 中断处理程序
pub trait IrqHandler: Debug + Send + Sync {
    fn handle(
        &self,
        irq: IrqNumber,
        dynamic_data: Option<&Arc<dyn IrqHandlerData>>,
    ) -> Result<IrqReturn, SystemError>;
}

/// 注册中断时传入的设备私有数据（cookie）
pub trait IrqHandlerData: Send + Sync + Any + Debug {}

/// 中断流处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqFlowType {
    /// 先处理后EOI的流（handle_fasteoi_irq）
    FastEoi,
    /// 每CPU中断流（handle_percpu_irq）
    PerCpu,
}

bitflags! {
    /// 注册中断处理程序时使用的标志
    pub struct IrqHandleFlags: u32 {
        /// IRQF_SHARED - 允许多个设备共享中断
        const IRQF_SHARED = 0x00000080;
        /// IRQF_TIMER - 标记此中断为定时器中断
        const __IRQF_TIMER = 0x00000200;
        /// IRQF_PERCPU - 中断是每个CPU的
        const IRQF_PERCPU = 0x00000400;
        /// IRQF_NOBALANCING - 将此中断从中断平衡中排除
        const IRQF_NOBALANCING = 0x00000800;
        /// IRQF_NO_SUSPEND - 在挂起期间不禁用此IRQ。不能保证此中断会从挂起状态唤醒系统。
        const IRQF_NO_SUSPEND = 0x00004000;
        /// IRQF_FORCE_RESUME - 即使设置了IRQF_NO_SUSPEND，也强制在恢复时启用它
        const IRQF_FORCE_RESUME = 0x00008000;
        /// IRQF_NO_THREAD - 中断不能被线程化
        const IRQF_NO_THREAD = 0x00010000;
        /// IRQF_EARLY_RESUME - 在syscore而不是在设备恢复时间早期恢复IRQ。
        const IRQF_EARLY_RESUME = 0x00020000;
        const IRQF_TIMER = Self::__IRQF_TIMER.bits | Self::IRQF_NO_SUSPEND.bits | Self::IRQF_NO_THREAD.bits;
    }
}

/// 宿主中断核心向本子系统暴露的接口
///
/// 中断描述符的分配、处理程序的注册与分发、亲和性记录等都由
/// 宿主的中断子系统负责，这里只消费它的能力。
pub trait IrqCoreOps: Debug + Send + Sync {
    /// 系统支持的中断总数
    fn nr_irqs(&self) -> u32;
    /// 硬件身份映射区间的大小（`irq < nr_hw_irqs`的IRQ号保留给
    /// 物理vector与irq号相等的pass-through中断）
    fn nr_hw_irqs(&self) -> u32;
    /// 可能存在的CPU数量
    fn possible_cpus(&self) -> u32;
    /// 当前执行流所在的CPU
    fn current_cpu(&self) -> ProcessorId;

    /// 为irq分配并初始化宿主中断描述符（若已存在则保留芯片私有数据）
    fn activate_irq(&self, irq: IrqNumber) -> Result<(), SystemError>;
    /// 将irq的宿主描述符重置为未使用状态
    fn release_irq(&self, irq: IrqNumber);

    /// 绑定中断芯片与中断流处理程序
    fn set_chip_and_handler(
        &self,
        irq: IrqNumber,
        chip: Arc<dyn IrqChip>,
        flow: IrqFlowType,
        name: &'static str,
    );
    /// 查询irq当前绑定的芯片；描述符不存在或未绑定芯片时返回None
    fn chip_of(&self, irq: IrqNumber) -> Option<Arc<dyn IrqChip>>;

    /// 在中断线上注册一个处理函数
    fn request_irq(
        &self,
        irq: IrqNumber,
        name: String,
        handler: &'static dyn IrqHandler,
        flags: IrqHandleFlags,
        dev_id: Option<Arc<dyn IrqHandlerData>>,
    ) -> Result<(), SystemError>;
    /// 注销处理函数并禁用中断线
    fn free_irq(&self, irq: IrqNumber, dev_id: Option<Arc<dyn IrqHandlerData>>);

    /// 描述符上是否已注册处理动作
    fn has_action(&self, irq: IrqNumber) -> bool;
    /// 第一个处理动作的注册标志；没有动作时返回None
    fn irq_flags(&self, irq: IrqNumber) -> Option<IrqHandleFlags>;
    /// 中断线当前是否被禁用
    fn is_disabled(&self, irq: IrqNumber) -> bool;
    /// 中断线上是否有被推迟的pending事件
    fn is_pending(&self, irq: IrqNumber) -> bool;
    /// 在中断线处于屏蔽状态时完成挂起的亲和性迁移
    fn irq_move_masked(&self, irq: IrqNumber);
    /// 更新描述符中记录的亲和性（不触发芯片回调）
    fn desc_set_affinity(&self, irq: IrqNumber, mask: &CpuMask);
    fn disable_irq(&self, irq: IrqNumber);
    fn enable_irq(&self, irq: IrqNumber);

    /// 将中断分发给注册的处理程序
    fn dispatch(&self, irq: IrqNumber) -> Result<IrqReturn, SystemError>;
}
