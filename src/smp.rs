use core::sync::atomic::AtomicU32;

// 处理器的逻辑编号
int_like!(ProcessorId, AtomicProcessorId, u32, AtomicU32);

impl ProcessorId {
    pub const INVALID: ProcessorId = ProcessorId::new(u32::MAX);
}

pub struct PerCpu;

impl PerCpu {
    /// 系统支持的最大CPU数量
    pub const MAX_CPU_NUM: u32 = 128;
}
