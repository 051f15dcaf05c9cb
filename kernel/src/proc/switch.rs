use super::thread::{ThreadTable, Tid, flags};
use crate::cap::CapError;
use crate::hart::Hart;
use crate::liveness::LivenessTbl;
use crate::printk;
use crate::printk::{ANSI_RESET, ANSI_YELLOW};
use crate::trap::TrapContext;
use crate::trap::syscall::errcode;

/// 线程切换引擎
///
/// 同核两线程间的机械切换：交换寄存器帧、切地址空间、抢占标记记账。
/// 要么完整切换成功并从 next 恢复，要么什么都不改、curr 带着
/// Fault 码继续运行，没有中间状态。
///
/// 返回 next 此前是否带 PREEMPTED 标记 (1/0)，供调度统计使用。
pub fn switch_thd(
    hart: &mut Hart,
    threads: &mut ThreadTable,
    liveness: &dyn LivenessTbl,
    regs: &mut TrapContext,
    curr: Tid,
    next: Tid,
) -> Result<usize, CapError> {
    let next_ci = threads.get(next).current_comp();

    // 先查目标组件存活；失败则不动任何状态，由分发层给 curr 回写 Fault
    if !liveness.is_alive(next_ci.liveness) {
        printk!(
            "{}[WARN] switch: comp (liveness {}) doesn't exist{}\n",
            ANSI_YELLOW,
            next_ci.liveness,
            ANSI_RESET
        );
        return Err(CapError::Fault);
    }

    // 从这里开始不再失败
    {
        let t = threads.get_mut(curr);
        t.regs = *regs;
        // curr 未来恢复时看到的返回值
        t.regs.set_ret(errcode::SUCCESS as usize);
    }

    hart.record_current(next);
    hart.load_pgtbl(next_ci.pgtbl);

    let mut preempt = 0;
    {
        let t = threads.get_mut(next);
        if t.flags & flags::PREEMPTED != 0 {
            t.flags &= !flags::PREEMPTED;
            preempt = 1;
        }
        *regs = t.regs;
    }

    Ok(preempt)
}
