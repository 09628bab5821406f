use core::fmt::Debug;

use system_error::SystemError;

use crate::irqcore::IrqNumber;
use crate::libs::cpumask::CpuMask;

/// 中断芯片
///
/// 本子系统实现三种芯片并发布给宿主中断核心，由中断流处理程序
/// 在合适的时机回调其中的操作。
pub trait IrqChip: Sync + Send + Debug {
    fn name(&self) -> &'static str;

    /// start up the interrupt (defaults to ->enable if ENOSYS)
    fn irq_startup(&self, _irq: IrqNumber) -> Result<(), SystemError> {
        Err(SystemError::ENOSYS)
    }

    /// shut down the interrupt
    fn irq_shutdown(&self, _irq: IrqNumber) {}

    /// enable the interrupt
    ///
    /// (defaults to ->unmask if ENOSYS)
    fn irq_enable(&self, _irq: IrqNumber) -> Result<(), SystemError> {
        Err(SystemError::ENOSYS)
    }

    /// disable the interrupt
    fn irq_disable(&self, irq: IrqNumber);

    /// start of a new interrupt
    fn irq_ack(&self, _irq: IrqNumber) {}

    /// mask an interrupt source
    ///
    /// 用于屏蔽中断
    fn irq_mask(&self, _irq: IrqNumber) -> Result<(), SystemError> {
        Err(SystemError::ENOSYS)
    }

    /// unmask an interrupt source
    ///
    /// 用于取消屏蔽中断
    fn irq_unmask(&self, _irq: IrqNumber) -> Result<(), SystemError> {
        Err(SystemError::ENOSYS)
    }

    /// end of interrupt
    fn irq_eoi(&self, _irq: IrqNumber) {}

    /// 中断流结束回调
    ///
    /// 只有pass-through流使用；每个在途中断只会被回调一次。
    fn irq_end(&self, _irq: IrqNumber) {}

    /// 指示当前芯片是否可以设置中断亲和性。
    fn can_set_affinity(&self) -> bool;

    /// 在SMP机器上设置CPU亲和性。
    fn irq_set_affinity(
        &self,
        _irq: IrqNumber,
        _mask: &CpuMask,
    ) -> Result<IrqChipSetMaskResult, SystemError> {
        Err(SystemError::ENOSYS)
    }

    /// retrigger an IRQ to the CPU
    fn retrigger(&self, _irq: IrqNumber) -> Result<(), SystemError> {
        Err(SystemError::ENOSYS)
    }

    fn flags(&self) -> IrqChipFlags {
        IrqChipFlags::empty()
    }
}

/// 设置CPU亲和性的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqChipSetMaskResult {
    /// 设置成功，中断核心需要更新描述符中的亲和性副本
    Success,
    /// 设置成功，亲和性副本已由芯片更新，中断核心无需再写
    NoCopy,
    /// 设置成功，并且中断核心无需进一步处理
    Done,
}

bitflags! {
    /// 中断芯片的属性标志
    pub struct IrqChipFlags: u32 {
        /// 在调用irq_set_type()之前屏蔽中断
        const IRQCHIP_SET_TYPE_MASKED = 1 << 0;
        /// 只有在处理了中断的情况下才发送EOI
        const IRQCHIP_EOI_IF_HANDLED = 1 << 1;
        /// 在挂起路径中屏蔽非唤醒中断
        const IRQCHIP_MASK_ON_SUSPEND = 1 << 2;
        /// 芯片天然one-shot安全
        const IRQCHIP_ONESHOT_SAFE = 1 << 3;
        /// 跳过chip.irq_set_wake()，对于这个irq芯片，假装有电源管理
        const IRQCHIP_SKIP_SET_WAKE = 1 << 4;
    }
}
