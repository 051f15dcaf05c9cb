//! 线程切换引擎测试：原子性、亲和、抢占标记

use super::util::{World, invoke, ret_of, sysregs};
use crate::cap::CapType;
use crate::proc::flags;
use crate::trap::syscall::errcode;

#[test]
fn thd_dispatch_switches_atomically() {
    let (mut w, c0, t0, mut hart) = World::boot();
    let t1 = w.new_thread(c0, 0);
    w.install(c0.captbl, 5, CapType::Thd { thd: t1, core: 0 });

    let mut regs = sysregs(5, 0, &[]);
    regs.sepc = 0x40_1234;
    regs.s0 = 0xDEAD;
    let before = regs;

    let preempt = invoke(&mut w, &mut hart, &mut regs);
    assert_eq!(preempt, 0);

    // 活动帧换成 t1 激活时播种的帧
    assert_eq!(regs.sepc, c0.entry);
    assert_eq!(regs.a0, 0);

    // t0 的保存帧 = 切换前的活动帧 + 未来恢复时的成功码
    let mut expect = before;
    expect.set_ret(errcode::SUCCESS as usize);
    assert_eq!(w.threads.get(t0).regs, expect);

    assert_eq!(hart.current, t1);
    assert_eq!(hart.active_pgtbl, c0.pgtbl);
}

#[test]
fn switch_to_dead_comp_resumes_current() {
    let (mut w, c0, t0, mut hart) = World::boot();
    let c1 = w.new_comp(1, 0x50_0000);
    let t1 = w.new_thread(c1, 0);
    w.install(c0.captbl, 5, CapType::Thd { thd: t1, core: 0 });
    w.live.kill(1);

    let mut regs = sysregs(5, 0, &[]);
    regs.sepc = 0x40_9999;
    let preempt = invoke(&mut w, &mut hart, &mut regs);
    assert_eq!(preempt, 0);

    // 局部可恢复失败：只有调用方的返回值槽被写
    assert_eq!(ret_of(&regs), errcode::EFAULT);
    assert_eq!(regs.sepc, 0x40_9999);
    assert_eq!(hart.current, t0);
    assert_eq!(hart.active_pgtbl, c0.pgtbl);
    // 两个线程的保存帧都没动
    assert_eq!(w.threads.get(t0).regs.sepc, c0.entry);
    assert_eq!(w.threads.get(t1).regs.sepc, 0x50_0000);
}

#[test]
fn thd_cap_is_core_local() {
    let (mut w, c0, t0, mut hart) = World::boot();
    let t1 = w.new_thread(c0, 1);
    w.install(c0.captbl, 5, CapType::Thd { thd: t1, core: 1 });

    // 核亲和不符：从核 0 派发核 1 的线程能力
    let mut regs = sysregs(5, 0, &[]);
    invoke(&mut w, &mut hart, &mut regs);
    assert_eq!(ret_of(&regs), errcode::EINVAL);
    assert_eq!(hart.current, t0);
}

#[test]
fn preempted_flag_cleared_and_reported() {
    let (mut w, c0, _t0, mut hart) = World::boot();
    let t1 = w.new_thread(c0, 0);
    w.threads.get_mut(t1).flags |= flags::PREEMPTED;
    w.install(c0.captbl, 5, CapType::Thd { thd: t1, core: 0 });

    let mut regs = sysregs(5, 0, &[]);
    let preempt = invoke(&mut w, &mut hart, &mut regs);
    assert_eq!(preempt, 1);
    assert_eq!(w.threads.get(t1).flags & flags::PREEMPTED, 0);
}

#[test]
fn switch_back_and_forth_restores_frames() {
    let (mut w, c0, t0, mut hart) = World::boot();
    let t1 = w.new_thread(c0, 0);
    w.install(c0.captbl, 5, CapType::Thd { thd: t1, core: 0 });
    w.install(c0.captbl, 6, CapType::Thd { thd: t0, core: 0 });

    let mut regs = sysregs(5, 0, &[]);
    regs.sepc = 0x40_1000;
    regs.s1 = 111;
    invoke(&mut w, &mut hart, &mut regs);
    assert_eq!(hart.current, t1);

    // t1 切回 t0：t0 从保存帧恢复，返回值是成功码
    let mut regs2 = regs;
    regs2.a0 = 6;
    invoke(&mut w, &mut hart, &mut regs2);
    assert_eq!(hart.current, t0);
    assert_eq!(regs2.sepc, 0x40_1000);
    assert_eq!(regs2.s1, 111);
    assert_eq!(ret_of(&regs2), errcode::SUCCESS);
}
