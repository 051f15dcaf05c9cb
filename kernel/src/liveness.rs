use core::sync::atomic::{AtomicBool, Ordering};

/// 组件存活标识符，指向存活表中的一个世代标记
pub type LivenessId = usize;

/// 存活表条目数
pub const LTBL_ENTS: usize = 256;

/// 存活注册表 (Liveness Registry)
/// 本核心只查询，从不修改；世代翻转由外部的组件销毁流程执行，
/// 且保证经过一个静默期后才翻转 (定时器粒度)
pub trait LivenessTbl {
    fn is_alive(&self, id: LivenessId) -> bool;
}

/// 基于固定数组的存活表实现，供内核初始化代码与测试使用
pub struct EpochTbl {
    alive: [AtomicBool; LTBL_ENTS],
}

impl EpochTbl {
    pub const fn new() -> Self {
        Self { alive: [const { AtomicBool::new(false) }; LTBL_ENTS] }
    }

    /// 组件创建时标记存活
    pub fn activate(&self, id: LivenessId) {
        self.alive[id].store(true, Ordering::Release);
    }

    /// 组件销毁 (静默期结束后) 翻转世代
    pub fn kill(&self, id: LivenessId) {
        self.alive[id].store(false, Ordering::Release);
    }
}

impl LivenessTbl for EpochTbl {
    fn is_alive(&self, id: LivenessId) -> bool {
        id < LTBL_ENTS && self.alive[id].load(Ordering::Acquire)
    }
}

impl Default for EpochTbl {
    fn default() -> Self {
        Self::new()
    }
}
