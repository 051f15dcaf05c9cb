use crate::mem::PgtblRoot;
use crate::proc::Tid;

pub const MAX_HARTS: usize = 8;

pub type CoreId = usize;

/// 每核上下文
/// 启动时每核构造一个，进程生命周期内不再搬动；
/// 所有分发调用都显式携带所属核的 Hart 引用，不走全局查找
pub struct Hart {
    pub id: CoreId,
    /// 本核当前运行的线程
    pub current: Tid,
    /// 当前生效的地址空间根
    pub active_pgtbl: PgtblRoot,
}

impl Hart {
    pub fn new(id: CoreId, boot_thd: Tid, boot_pgtbl: PgtblRoot) -> Self {
        assert!(id < MAX_HARTS);
        Self { id, current: boot_thd, active_pgtbl: boot_pgtbl }
    }

    /// 当前线程记账 (切换引擎在寄存器交换前调用)
    pub fn record_current(&mut self, next: Tid) {
        self.current = next;
    }

    /// 切换生效地址空间
    pub fn load_pgtbl(&mut self, root: PgtblRoot) {
        self.active_pgtbl = root;

        #[cfg(all(target_arch = "riscv64", target_os = "none"))]
        unsafe {
            use riscv::register::satp;
            satp::set(satp::Mode::Sv39, 0, root >> 12);
            riscv::asm::sfence_vma_all();
        }
    }
}
