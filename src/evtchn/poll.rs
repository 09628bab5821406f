use crate::irqcore::IrqNumber;

use super::manage::EvtchnManager;

impl EvtchnManager {
    /// 清除IRQ对应端口的pending状态，为轮询做准备
    ///
    /// 本接口与下面的set/test不持有全局锁，供独占使用该端口的
    /// 调用者使用。
    pub fn xen_clear_irq_pending(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            self.shared.clear_evtchn(evtchn);
        }
    }

    /// 置位IRQ对应端口的pending状态
    pub fn xen_set_irq_pending(&self, irq: IrqNumber) {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            self.shared.set_evtchn(evtchn);
        }
    }

    /// 查询IRQ对应端口的pending状态
    pub fn xen_test_irq_pending(&self, irq: IrqNumber) -> bool {
        let evtchn = self.evtchn_from_irq(irq);
        if evtchn.is_valid() {
            return self.shared.test_evtchn(evtchn);
        }
        return false;
    }

    /// 带超时地等待端口变为pending
    ///
    /// hypervisor会阻塞当前VCPU直到端口变为pending或者超时到达。
    /// 通常此时中断线处于禁用状态，事件不会真的投递为中断。
    pub fn xen_poll_irq_timeout(&self, irq: IrqNumber, timeout_ns: u64) {
        let evtchn = self.evtchn_from_irq(irq);

        if evtchn.is_valid() && self.hv.sched_poll(evtchn, timeout_ns).is_err() {
            panic!("SCHEDOP_poll on port {} failed", evtchn.data());
        }
    }

    /// 等待端口变为pending（无超时）
    pub fn xen_poll_irq(&self, irq: IrqNumber) {
        self.xen_poll_irq_timeout(irq, 0);
    }
}
