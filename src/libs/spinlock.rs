use core::fmt::Debug;
use core::ops::{Deref, DerefMut};

/// 自旋锁
///
/// 对`spin::Mutex`的封装，提供与内核内部约定一致的
/// `lock()`/`lock_irqsave()`接口。
///
/// 本子系统的所有中断热路径都由宿主在本地中断关闭的前提下进入
/// （上行调用的调用约定），锁本身不负责开关中断。
#[derive(Debug)]
pub struct SpinLock<T>(spin::Mutex<T>);

/// 自旋锁的守卫，被drop时自动释放锁
pub struct SpinLockGuard<'a, T>(spin::MutexGuard<'a, T>);

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        Self(spin::Mutex::new(value))
    }

    #[inline(always)]
    pub fn lock(&self) -> SpinLockGuard<T> {
        SpinLockGuard(self.0.lock())
    }

    /// 加锁。调用点位于中断可能关闭的上下文时使用本接口。
    #[inline(always)]
    pub fn lock_irqsave(&self) -> SpinLockGuard<T> {
        return self.lock();
    }
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
