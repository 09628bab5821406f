use bitmap::{traits::BitMapOps, AllocBitmap};

use crate::smp::{PerCpu, ProcessorId};

#[derive(Clone, PartialEq, Eq)]
pub struct CpuMask {
    bmp: AllocBitmap,
}

#[allow(dead_code)]
impl CpuMask {
    pub fn new() -> Self {
        let bmp = AllocBitmap::new(PerCpu::MAX_CPU_NUM as usize);
        Self { bmp }
    }

    /// 生成仅包含指定cpu的掩码
    pub fn single(cpu: ProcessorId) -> Self {
        let mut mask = Self::new();
        mask.set(cpu, true);
        mask
    }

    /// 获取CpuMask中的第一个cpu
    pub fn first(&self) -> Option<ProcessorId> {
        self.bmp
            .first_index()
            .map(|index| ProcessorId::new(index as u32))
    }

    /// 获取指定cpu之后第一个为1的位的cpu
    pub fn next_index(&self, cpu: ProcessorId) -> Option<ProcessorId> {
        self.bmp
            .next_index(cpu.data() as usize)
            .map(|index| ProcessorId::new(index as u32))
    }

    pub fn set(&mut self, cpu: ProcessorId, value: bool) -> Option<bool> {
        self.bmp.set(cpu.data() as usize, value)
    }

    pub fn get(&self, cpu: ProcessorId) -> bool {
        self.bmp.get(cpu.data() as usize).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.bmp.is_empty()
    }

    /// 迭代所有被置位的cpu
    pub fn iter_cpu(&self) -> CpuMaskIter {
        CpuMaskIter {
            mask: self,
            index: None,
        }
    }
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter_cpu()).finish()
    }
}

pub struct CpuMaskIter<'a> {
    mask: &'a CpuMask,
    index: Option<ProcessorId>,
}

impl Iterator for CpuMaskIter<'_> {
    type Item = ProcessorId;

    fn next(&mut self) -> Option<Self::Item> {
        let next = match self.index {
            None => self.mask.first(),
            Some(cpu) => self.mask.next_index(cpu),
        };
        self.index = next;
        next
    }
}
