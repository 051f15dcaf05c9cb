use super::captbl::{CAPTBL_LEAF_SLOTS, CaptblId, CaptblSet};
use super::{CapError, CapId, CapKind, CapType, CompInfo, op};
use crate::hart::{CoreId, Hart};
use crate::irq::ipi::{IpiRings, IpiSender, RingEp};
use crate::liveness::LivenessTbl;
use crate::mem::{KernMem, PgtblLvl, PgtblOps, PgtblRoot, VirtAddr};
use crate::printk;
use crate::printk::{ANSI_RED, ANSI_RESET, ANSI_YELLOW};
use crate::proc::invstk::InvFrame;
use crate::proc::switch::switch_thd;
use crate::proc::{ThreadTable, Tid, flags};
use crate::trap::TrapContext;
use crate::trap::syscall::{encode, errcode};

/// 保留的默认返回能力 ID：同步返回不需要查表
pub const DEFAULT_RET_CAP: CapId = 0;

/// 分发调用可见的内核状态与协作者接口
/// 每核各跑一个分发实例；threads/captbls 的共享纪律见各自模块
pub struct KernCtx<'a> {
    pub captbls: &'a mut CaptblSet,
    pub threads: &'a mut ThreadTable,
    pub rings: &'a IpiRings,
    pub liveness: &'a dyn LivenessTbl,
    pub kmem: &'a mut dyn KernMem,
    pub pgtbl: &'a mut dyn PgtblOps,
    pub ipi: &'a dyn IpiSender,
}

/// 一次分发的去向：写回返回值，或控制权已转移
enum Routed {
    /// 整数结果写入调用者的返回值槽
    Ret(usize),
    /// 寄存器帧已换成别的线程，携带 preempt 标记
    Switch(usize),
}

/// 能力分发器入口
///
/// 从陷阱上下文取能力 ID 与操作，完成恰好一个动作：
/// 结果写回 regs.a0，或把 regs 换成被切入线程的帧。
/// 返回值为 preempt 标记，交给恢复路径做调度统计。
pub fn dispatch(k: &mut KernCtx, hart: &mut Hart, regs: &mut TrapContext) -> usize {
    match route(k, hart, regs) {
        Ok(Routed::Switch(preempt)) => preempt,
        Ok(Routed::Ret(val)) => {
            regs.set_ret(val);
            0
        }
        Err(e) => {
            // 错误就地化解为调用者的返回码，不波及内核或其他线程
            regs.set_ret(encode(e) as usize);
            0
        }
    }
}

fn route(k: &mut KernCtx, hart: &mut Hart, regs: &mut TrapContext) -> Result<Routed, CapError> {
    let cap = regs.sys_cap();
    let curr = hart.current;

    // 快路径一：调用返回，无条件，不查表
    if cap == DEFAULT_RET_CAP {
        return sret_ret(k, hart, regs, curr);
    }

    // 当前组件取自调用栈栈顶。不查调用方自身的存活：
    // 组件销毁延迟到静默期 (定时器粒度) 之后，运行中的调用方必然存活
    let ci = k.threads.get(curr).current_comp();

    let ch = match k.captbls.get(ci.captbl).lookup(cap) {
        Ok(ch) => *ch,
        Err(e) => {
            printk!("{}[WARN] cap {} not found{}\n", ANSI_YELLOW, cap, ANSI_RESET);
            return Err(e);
        }
    };

    // 快路径二：同步调用
    if let CapType::Sinv { comp, entry } = ch {
        return sinv_call(k, hart, regs, curr, comp, entry);
    }

    // 次常见：线程派发与异步收发
    match ch {
        CapType::Thd { thd, core } => {
            // 线程能力只在其所属核上有效
            if core != hart.id {
                return Err(CapError::InvalidCap);
            }
            debug_assert_eq!(core, k.threads.get(thd).affinity);
            switch_thd(hart, k.threads, k.liveness, regs, curr, thd).map(Routed::Switch)
        }
        CapType::Asnd { arcv_cap, core, comp } => asnd_call(k, hart, regs, curr, arcv_cap, core, comp),
        CapType::Arcv { thd, core, .. } => arcv_call(k, hart, regs, curr, ci, cap, thd, core),
        CapType::Sret => sret_ret(k, hart, regs, curr),

        // 慢路径：能力表结构修改，多为写操作
        CapType::Captbl { ct } => captbl_op(k, hart, regs, ci, ct),
        CapType::Pgtbl { root, lvl } => pgtbl_op(k, regs, ci, root, lvl),

        CapType::Comp(_) | CapType::Empty => Err(CapError::InvalidCap),

        // 同步调用在上面的快路径已提前返回，此处不可达
        CapType::Sinv { .. } => unreachable!(),
    }
}

/// 同步调用快路径：压栈调用方恢复点，切入目标组件入口
/// 只查被调方存活 (见 route 中关于调用方的注释)
fn sinv_call(
    k: &mut KernCtx,
    hart: &mut Hart,
    regs: &mut TrapContext,
    curr: Tid,
    comp: CompInfo,
    entry: VirtAddr,
) -> Result<Routed, CapError> {
    if !k.liveness.is_alive(comp.liveness) {
        printk!(
            "{}[WARN] sinv: comp (liveness {}) doesn't exist{}\n",
            ANSI_YELLOW,
            comp.liveness,
            ANSI_RESET
        );
        return Err(CapError::Fault);
    }

    let token;
    {
        let t = k.threads.get_mut(curr);
        t.invstk.push(InvFrame { comp, ip: regs.sepc, sp: regs.sp })?;
        // 被调组件在返回值槽里拿到 (核 ID, 线程 ID) 标记
        token = t.tid.0 | (hart.id << 16);
    }

    hart.load_pgtbl(comp.pgtbl);
    regs.sepc = entry;
    Ok(Routed::Ret(token))
}

/// 同步返回：弹栈恢复调用方的 ip/sp 与地址空间
/// 空栈 (只剩宿主帧) 时返回是定义良好的错误，不动任何状态；
/// 被调方经 a1 传回的返回字透传给调用方的 a0
fn sret_ret(
    k: &mut KernCtx,
    hart: &mut Hart,
    regs: &mut TrapContext,
    curr: Tid,
) -> Result<Routed, CapError> {
    let (frame, back) = {
        let t = k.threads.get_mut(curr);
        let frame = t.invstk.pop().ok_or(CapError::InvalidCap)?;
        (frame, t.invstk.top().comp)
    };

    hart.load_pgtbl(back.pgtbl);
    let ret = regs.sys_op();
    regs.sepc = frame.ip;
    regs.sp = frame.sp;
    Ok(Routed::Ret(ret))
}

/// 异步发送
fn asnd_call(
    k: &mut KernCtx,
    hart: &mut Hart,
    regs: &mut TrapContext,
    curr: Tid,
    arcv_cap: CapId,
    core: CoreId,
    comp: CompInfo,
) -> Result<Routed, CapError> {
    debug_assert_ne!(arcv_cap, DEFAULT_RET_CAP);

    if core != hart.id {
        // 跨核：登记端点、推进计数、发核间信号，立即返回。
        // 投递是异步且合并的 (见 irq::ipi)
        k.rings.publish(hart.id, core, RingEp { captbl: comp.captbl, cap: arcv_cap });
        k.ipi.send_ipi(core);
        return Ok(Routed::Ret(errcode::SUCCESS as usize));
    }

    // 同核：当作直接 upcall，对端点绑定的线程做切换
    if !k.liveness.is_alive(comp.liveness) {
        return Err(CapError::Fault);
    }

    let rthd = match k.captbls.get(comp.captbl).lookup(arcv_cap) {
        Ok(CapType::Arcv { thd, .. }) => *thd,
        _ => {
            printk!(
                "{}[WARN] asnd: invalid arcv cap {}{}\n",
                ANSI_YELLOW,
                arcv_cap,
                ANSI_RESET
            );
            return Err(CapError::InvalidCap);
        }
    };

    // 留下反向引用，接收端稍后凭它恢复被抢占的现场
    k.threads.get_mut(rthd).interrupted_thread = Some(curr);

    switch_thd(hart, k.threads, k.liveness, regs, curr, rthd).map(Routed::Switch)
}

/// 异步接收
fn arcv_call(
    k: &mut KernCtx,
    hart: &mut Hart,
    regs: &mut TrapContext,
    curr: Tid,
    ci: CompInfo,
    cap: CapId,
    owner: Tid,
    core: CoreId,
) -> Result<Routed, CapError> {
    // 端点绑定到唯一线程，旁人不得接收
    if owner != curr {
        return Err(CapError::InvalidCap);
    }
    debug_assert_eq!(core, hart.id);

    // 快路径：已有未决通知，消费一个立即返回，不切换
    if let CapType::Arcv { pending, .. } = k.captbls.get_mut(ci.captbl).lookup_mut(cap)? {
        if *pending > 0 {
            *pending -= 1;
            return Ok(Routed::Ret(errcode::SUCCESS as usize));
        }
    }

    let intr = {
        let t = k.threads.get_mut(curr);
        match t.interrupted_thread {
            Some(intr) => {
                // 阻塞等下一次通知：记下端点，标记 upcall 就绪，
                // 把控制权"还"给先前被抢占的线程
                t.arcv_cap = cap;
                t.flags &= !flags::ACTIVE_UPCALL;
                t.flags |= flags::READY_UPCALL;
                intr
            }
            None => {
                // 没有可恢复的线程，也没有调度器 upcall 路径：
                // 留作已定义的缺口，交由外部调度协作者补齐
                printk!("{}[ERROR] arcv: no scheduler upcall path{}\n", ANSI_RED, ANSI_RESET);
                return Err(CapError::Unimplemented);
            }
        }
    };

    switch_thd(hart, k.threads, k.liveness, regs, curr, intr).map(Routed::Switch)
}

/// 核间通知的接收侧：目标核中断处理中调用
/// 对每个计数不等的 (源核, 本核) 槽恢复端点并递增其未决计数；
/// 解析失败说明端点已被拆除，记日志后跳过
pub fn ipi_handle(k: &mut KernCtx, hart: &Hart) {
    let captbls = &mut *k.captbls;
    k.rings.scan(hart.id, |src, ep| {
        match captbls.get_mut(ep.captbl).lookup_mut(ep.cap) {
            Ok(CapType::Arcv { pending, .. }) => *pending += 1,
            _ => {
                printk!(
                    "{}[WARN] ipi: stale notification ep from core {}{}\n",
                    ANSI_YELLOW,
                    src,
                    ANSI_RESET
                );
            }
        }
    });
}

/// CAPTBL 能力的慢路径操作开关
/// dest 是被调用能力所引用的表：激活/失活都作用在它身上
fn captbl_op(
    k: &mut KernCtx,
    hart: &Hart,
    regs: &TrapContext,
    ci: CompInfo,
    dest: CaptblId,
) -> Result<Routed, CapError> {
    let op = regs.sys_op();
    let capin = regs.sys_arg(0);
    let root = ci.captbl;

    match op {
        op::CAPTBL_ACTIVATE => {
            let pgtbl_cap = regs.sys_arg(0);
            let kmem_cap = regs.sys_arg(1);
            let newcaptbl_cap = regs.sys_arg(2);

            let page = k.kmem.retype_to_kern(k.captbls.get(root), pgtbl_cap, kmem_cap)?;
            let ct = k.captbls.create(page);
            k.captbls.get_mut(dest).install(newcaptbl_cap, CapType::Captbl { ct })?;
        }
        op::PGD_ACTIVATE => {
            let pgtbl_cap = regs.sys_arg(0);
            let kmem_cap = regs.sys_arg(1);
            let newpgd_cap = regs.sys_arg(2);

            let page = k.kmem.retype_to_kern(k.captbls.get(root), pgtbl_cap, kmem_cap)?;
            let curr_pt = match k.captbls.get(root).lookup(pgtbl_cap)? {
                CapType::Pgtbl { root, .. } => *root,
                _ => return Err(CapError::InvalidCap),
            };
            let new_pt = k.pgtbl.init_root(page, curr_pt)?;
            k.captbls
                .get_mut(dest)
                .install(newpgd_cap, CapType::Pgtbl { root: new_pt, lvl: PgtblLvl::Root })?;
        }
        op::PTE_ACTIVATE => {
            let pgtbl_cap = regs.sys_arg(0);
            let kmem_cap = regs.sys_arg(1);
            let newpte_cap = regs.sys_arg(2);

            let page = k.kmem.retype_to_kern(k.captbls.get(root), pgtbl_cap, kmem_cap)?;
            let node = k.pgtbl.init_pte(page)?;
            k.captbls
                .get_mut(dest)
                .install(newpte_cap, CapType::Pgtbl { root: node, lvl: PgtblLvl::Pte })?;
        }
        op::THD_ACTIVATE => {
            // 四个操作数放不下五个参数：a2 低 16 位是目标槽，高位是 init 数据
            let thd_cap = regs.sys_arg(0) & 0xFFFF;
            let init_data = regs.sys_arg(0) >> 16;
            let pgtbl_cap = regs.sys_arg(1);
            let kmem_cap = regs.sys_arg(2);
            let comp_cap = regs.sys_arg(3);

            let page = k.kmem.retype_to_kern(k.captbls.get(root), pgtbl_cap, kmem_cap)?;
            let home = match k.captbls.get(root).lookup(comp_cap)? {
                CapType::Comp(comp) => *comp,
                _ => return Err(CapError::InvalidCap),
            };
            let thd = k.threads.activate(page, home, hart.id, init_data);
            k.captbls.get_mut(dest).install(thd_cap, CapType::Thd { thd, core: hart.id })?;
        }
        op::THD_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Thd)?,
        op::COMP_ACTIVATE => {
            let captbl_cap = regs.sys_arg(1) >> 16;
            let pgtbl_cap = regs.sys_arg(1) & 0xFFFF;
            let lid = regs.sys_arg(2);
            let entry = regs.sys_arg(3);

            let ct = match k.captbls.get(root).lookup(captbl_cap)? {
                CapType::Captbl { ct } => *ct,
                _ => return Err(CapError::InvalidCap),
            };
            let pt = match k.captbls.get(root).lookup(pgtbl_cap)? {
                CapType::Pgtbl { root, .. } => *root,
                _ => return Err(CapError::InvalidCap),
            };
            k.captbls.get_mut(dest).install(
                capin,
                CapType::Comp(CompInfo { captbl: ct, pgtbl: pt, liveness: lid, entry }),
            )?;
        }
        op::COMP_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Comp)?,
        op::SINV_ACTIVATE => {
            let comp_cap = regs.sys_arg(1);
            let entry = regs.sys_arg(2);

            let comp = match k.captbls.get(root).lookup(comp_cap)? {
                CapType::Comp(comp) => *comp,
                _ => return Err(CapError::InvalidCap),
            };
            k.captbls.get_mut(dest).install(capin, CapType::Sinv { comp, entry })?;
        }
        op::SINV_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Sinv)?,
        op::SRET_ACTIVATE => k.captbls.get_mut(dest).install(capin, CapType::Sret)?,
        op::SRET_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Sret)?,
        op::ASND_ACTIVATE => {
            let rcv_captbl = regs.sys_arg(1);
            let rcv_cap = regs.sys_arg(2);

            // ID 0 在分发入口被默认返回拦截，不能当接收端
            if rcv_cap == DEFAULT_RET_CAP {
                return Err(CapError::InvalidCap);
            }
            let rct = match k.captbls.get(root).lookup(rcv_captbl)? {
                CapType::Captbl { ct } => *ct,
                _ => return Err(CapError::InvalidCap),
            };
            let (core, comp) = match k.captbls.get(rct).lookup(rcv_cap)? {
                CapType::Arcv { core, comp, .. } => (*core, *comp),
                _ => return Err(CapError::InvalidCap),
            };
            k.captbls
                .get_mut(dest)
                .install(capin, CapType::Asnd { arcv_cap: rcv_cap, core, comp })?;
        }
        op::ASND_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Asnd)?,
        op::ARCV_ACTIVATE => {
            let thd_cap = regs.sys_arg(1);
            let comp_cap = regs.sys_arg(2);

            let (thd, core) = match k.captbls.get(root).lookup(thd_cap)? {
                CapType::Thd { thd, core } => (*thd, *core),
                _ => return Err(CapError::InvalidCap),
            };
            let comp = match k.captbls.get(root).lookup(comp_cap)? {
                CapType::Comp(comp) => *comp,
                _ => return Err(CapError::InvalidCap),
            };
            k.captbls
                .get_mut(dest)
                .install(capin, CapType::Arcv { thd, core, comp, pending: 0 })?;
        }
        op::ARCV_DEACTIVATE => k.captbls.get_mut(dest).clear(capin, CapKind::Arcv)?,
        op::CPY => {
            // 源表就是被调用能力引用的表
            let from_cap = regs.sys_arg(0);
            let dest_captbl = regs.sys_arg(1);
            let dest_cap = regs.sys_arg(2);

            let to = match k.captbls.get(root).lookup(dest_captbl)? {
                CapType::Captbl { ct } => *ct,
                _ => return Err(CapError::InvalidCap),
            };
            k.captbls.copy(dest, from_cap, to, dest_cap)?;
        }
        op::CONS => {
            // 树扩展：一页后备内存切成两个半页叶子，
            // 分别装在 capin 与 capin + CAPTBL_LEAF_SLOTS 处
            let pgtbl_cap = regs.sys_arg(1);
            let kmem_cap = regs.sys_arg(2);

            let page = k.kmem.retype_to_kern(k.captbls.get(root), pgtbl_cap, kmem_cap)?;
            let (lo, hi) = page.split();
            let target = k.captbls.get_mut(dest);
            target.expand(capin, lo)?;
            target.expand(capin + CAPTBL_LEAF_SLOTS, hi)?;
        }
        _ => return Err(CapError::InvalidCap),
    }

    Ok(Routed::Ret(errcode::SUCCESS as usize))
}

/// PGTBL 能力的慢路径操作开关；映射语义转发给页表协作者
fn pgtbl_op(
    k: &mut KernCtx,
    regs: &TrapContext,
    ci: CompInfo,
    pt: PgtblRoot,
    lvl: PgtblLvl,
) -> Result<Routed, CapError> {
    let op = regs.sys_op();
    let root = ci.captbl;

    match op {
        op::CPY => {
            let src_addr = regs.sys_arg(0);
            let dest_pt_cap = regs.sys_arg(1);
            let dest_addr = regs.sys_arg(2);

            let dst = match k.captbls.get(root).lookup(dest_pt_cap)? {
                CapType::Pgtbl { root, .. } => *root,
                _ => return Err(CapError::InvalidCap),
            };
            k.pgtbl.copy_mapping(pt, src_addr, dst, dest_addr)?;
        }
        op::CONS => {
            let pte_cap = regs.sys_arg(0);
            let cons_addr = regs.sys_arg(1);

            let pte = match k.captbls.get(root).lookup(pte_cap)? {
                CapType::Pgtbl { root, lvl: PgtblLvl::Pte } => *root,
                _ => return Err(CapError::InvalidCap),
            };
            k.pgtbl.cons(pt, pte, cons_addr)?;
        }
        // 原实现如此：可达但无事发生，按成功返回
        op::DECONS | op::MAPPING_CONS => {}
        op::MAPPING_DECONS => {
            let addr = regs.sys_arg(0);

            // 只能对整棵页表的根操作；游离的页表项叶子无映射可删
            if lvl != PgtblLvl::Root {
                return Err(CapError::InvalidCap);
            }
            k.pgtbl.mapping_del(pt, addr)?;
        }
        _ => return Err(CapError::InvalidCap),
    }

    Ok(Routed::Ret(errcode::SUCCESS as usize))
}
