//! 测试脚手架：模拟协作者 + 最小启动世界

use crate::cap::captbl::CaptblId;
use crate::cap::invoke::{KernCtx, dispatch};
use crate::cap::{CapError, CapId, CapType, CaptblSet, CompInfo};
use crate::hart::{CoreId, Hart};
use crate::irq::ipi::{IpiRings, IpiSender};
use crate::liveness::{EpochTbl, LivenessId};
use crate::mem::{KernMem, KernPage, PGSIZE, PgtblOps, PgtblRoot, VirtAddr};
use crate::proc::{ThreadTable, Tid};
use crate::trap::TrapContext;
use std::cell::RefCell;

pub const C0_ENTRY: VirtAddr = 0x40_0000;
pub const C0_PGTBL: PgtblRoot = 0x8000_0000;

/// 模拟 retype 协作者：顺序发放页地址，可注入失败
pub struct MockMem {
    next: usize,
    pub fail: bool,
}

impl MockMem {
    pub fn new() -> Self {
        Self { next: 0x8800_0000, fail: false }
    }

    pub fn page(&mut self) -> KernPage {
        let addr = self.next;
        self.next += PGSIZE;
        KernPage::new(addr)
    }
}

impl KernMem for MockMem {
    fn retype_to_kern(
        &mut self,
        _ct: &crate::cap::Captbl,
        _pgtbl_cap: CapId,
        _kmem_cap: CapId,
    ) -> Result<KernPage, CapError> {
        if self.fail {
            return Err(CapError::NoMem);
        }
        Ok(self.page())
    }
}

/// 模拟页表协作者：记录每次转发的调用
#[derive(Default)]
pub struct MockPgtbl {
    pub deleted: Vec<(PgtblRoot, VirtAddr)>,
    pub consed: Vec<(PgtblRoot, PgtblRoot, VirtAddr)>,
    pub copied: Vec<(PgtblRoot, VirtAddr, PgtblRoot, VirtAddr)>,
}

impl PgtblOps for MockPgtbl {
    fn init_root(&mut self, page: KernPage, _copy_from: PgtblRoot) -> Result<PgtblRoot, CapError> {
        Ok(page.addr())
    }

    fn init_pte(&mut self, page: KernPage) -> Result<PgtblRoot, CapError> {
        Ok(page.addr())
    }

    fn cons(&mut self, root: PgtblRoot, pte: PgtblRoot, at: VirtAddr) -> Result<(), CapError> {
        self.consed.push((root, pte, at));
        Ok(())
    }

    fn copy_mapping(
        &mut self,
        from: PgtblRoot,
        from_addr: VirtAddr,
        to: PgtblRoot,
        to_addr: VirtAddr,
    ) -> Result<(), CapError> {
        self.copied.push((from, from_addr, to, to_addr));
        Ok(())
    }

    fn mapping_del(&mut self, root: PgtblRoot, addr: VirtAddr) -> Result<(), CapError> {
        self.deleted.push((root, addr));
        Ok(())
    }
}

/// 模拟核间信号：只记录目标核
#[derive(Default)]
pub struct MockIpi {
    pub sent: RefCell<Vec<CoreId>>,
}

impl IpiSender for MockIpi {
    fn send_ipi(&self, core: CoreId) {
        self.sent.borrow_mut().push(core);
    }
}

/// 一套完整的内核状态 + 协作者
pub struct World {
    pub captbls: CaptblSet,
    pub threads: ThreadTable,
    pub rings: IpiRings,
    pub live: EpochTbl,
    pub kmem: MockMem,
    pub pgtbl: MockPgtbl,
    pub ipi: MockIpi,
}

impl World {
    /// 启动世界：组件 C0 (liveness 0) + 其中运行于核 0 的线程 t0
    pub fn boot() -> (World, CompInfo, Tid, Hart) {
        let mut w = World {
            captbls: CaptblSet::new(),
            threads: ThreadTable::new(),
            rings: IpiRings::new(),
            live: EpochTbl::new(),
            kmem: MockMem::new(),
            pgtbl: MockPgtbl::default(),
            ipi: MockIpi::default(),
        };
        let pg = w.kmem.page();
        let ct0 = w.captbls.create(pg);
        w.live.activate(0);
        let c0 = CompInfo { captbl: ct0, pgtbl: C0_PGTBL, liveness: 0, entry: C0_ENTRY };
        let pg = w.kmem.page();
        let t0 = w.threads.activate(pg, c0, 0, 0);
        let hart = Hart::new(0, t0, c0.pgtbl);
        (w, c0, t0, hart)
    }

    /// 直接建一个新组件 (启动代码路径，不经能力操作)
    pub fn new_comp(&mut self, lid: LivenessId, entry: VirtAddr) -> CompInfo {
        let pg = self.kmem.page();
        let ct = self.captbls.create(pg);
        self.live.activate(lid);
        CompInfo { captbl: ct, pgtbl: 0x9000_0000 + lid * PGSIZE, liveness: lid, entry }
    }

    pub fn new_thread(&mut self, home: CompInfo, core: CoreId) -> Tid {
        let pg = self.kmem.page();
        self.threads.activate(pg, home, core, 0)
    }

    pub fn install(&mut self, ct: CaptblId, id: CapId, cap: CapType) {
        self.captbls.get_mut(ct).install(id, cap).expect("install cap");
    }

    pub fn kctx(&mut self) -> KernCtx<'_> {
        KernCtx {
            captbls: &mut self.captbls,
            threads: &mut self.threads,
            rings: &self.rings,
            liveness: &self.live,
            kmem: &mut self.kmem,
            pgtbl: &mut self.pgtbl,
            ipi: &self.ipi,
        }
    }
}

/// 跑一次分发
pub fn invoke(w: &mut World, hart: &mut Hart, regs: &mut TrapContext) -> usize {
    let mut k = w.kctx();
    dispatch(&mut k, hart, regs)
}

/// 构造一个系统调用陷阱上下文
pub fn sysregs(cap: CapId, op: usize, args: &[usize]) -> TrapContext {
    let mut regs = TrapContext::new();
    regs.a0 = cap;
    regs.a1 = op;
    for (i, &v) in args.iter().enumerate() {
        match i {
            0 => regs.a2 = v,
            1 => regs.a3 = v,
            2 => regs.a4 = v,
            3 => regs.a5 = v,
            _ => panic!("syscall carries at most 4 operands"),
        }
    }
    regs
}

pub fn ret_of(regs: &TrapContext) -> isize {
    regs.a0 as isize
}
