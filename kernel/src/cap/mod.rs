pub mod captbl;
pub mod invoke;

pub use captbl::{Captbl, CaptblId, CaptblSet};
pub use invoke::KernCtx;

use crate::hart::CoreId;
use crate::liveness::LivenessId;
use crate::mem::{PgtblLvl, PgtblRoot, VirtAddr};
use crate::proc::Tid;

pub type CapId = usize;

/// 能力操作出错的分类；统一在 trap::syscall::encode 转成返回码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapError {
    /// 能力 ID 在表中无条目
    NotFound,
    /// 能力存在但类型/核亲和/绑定不符，或参数非法
    InvalidCap,
    /// 目标保护域已被并发销毁 (存活检查失败)
    Fault,
    /// 资源耗尽 (retype 失败、调用栈满)
    NoMem,
    /// 可达但本核心未实现的路径
    Unimplemented,
}

/// 组件信息：一个保护域 = 能力表 + 地址空间 + 存活标识 + 入口
/// 激活后不可变；存活标识由外部销毁流程作废。
/// 所有跨入该组件的能力 (SINV/THD/ASND/ARCV) 与调用栈帧按值持有它
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompInfo {
    pub captbl: CaptblId,
    pub pgtbl: PgtblRoot,
    pub liveness: LivenessId,
    pub entry: VirtAddr,
}

/// 能力记录：显式和类型，槽位的类型标签即变体本身
/// 任何负载访问都必须经过变体匹配，类型不符一律报错而非重释内存
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapType {
    Empty,

    /// 子能力表的独占引用
    Captbl { ct: CaptblId },

    /// 页表节点：整棵树的根，或一页未挂接的页表项叶子
    Pgtbl { root: PgtblRoot, lvl: PgtblLvl },

    /// 线程，只能在 core 指定的核上派发
    Thd { thd: Tid, core: CoreId },

    /// 保护域本体
    Comp(CompInfo),

    /// 同步调用门：单向进入 comp，落点为 entry
    Sinv { comp: CompInfo, entry: VirtAddr },

    /// 显式同步返回标记 (默认返回路径不需要查表)
    Sret,

    /// 发送端点：指向 comp 能力表中 arcv_cap 处的接收端
    Asnd { arcv_cap: CapId, core: CoreId, comp: CompInfo },

    /// 接收端点：绑定到唯一的 thd，带未决通知计数
    Arcv { thd: Tid, core: CoreId, comp: CompInfo, pending: u64 },
}

/// 类型标签，用于去负载的类型比对 (失活等操作)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapKind {
    Empty,
    Captbl,
    Pgtbl,
    Thd,
    Comp,
    Sinv,
    Sret,
    Asnd,
    Arcv,
}

impl CapType {
    pub fn kind(&self) -> CapKind {
        match self {
            CapType::Empty => CapKind::Empty,
            CapType::Captbl { .. } => CapKind::Captbl,
            CapType::Pgtbl { .. } => CapKind::Pgtbl,
            CapType::Thd { .. } => CapKind::Thd,
            CapType::Comp(_) => CapKind::Comp,
            CapType::Sinv { .. } => CapKind::Sinv,
            CapType::Sret => CapKind::Sret,
            CapType::Asnd { .. } => CapKind::Asnd,
            CapType::Arcv { .. } => CapKind::Arcv,
        }
    }
}

/// 慢路径操作码
pub mod op {
    pub const CAPTBL_ACTIVATE: usize = 0;
    pub const PGD_ACTIVATE: usize = 1;
    pub const PTE_ACTIVATE: usize = 2;
    pub const THD_ACTIVATE: usize = 3;
    pub const THD_DEACTIVATE: usize = 4;
    pub const COMP_ACTIVATE: usize = 5;
    pub const COMP_DEACTIVATE: usize = 6;
    pub const SINV_ACTIVATE: usize = 7;
    pub const SINV_DEACTIVATE: usize = 8;
    pub const SRET_ACTIVATE: usize = 9;
    pub const SRET_DEACTIVATE: usize = 10;
    pub const ASND_ACTIVATE: usize = 11;
    pub const ASND_DEACTIVATE: usize = 12;
    pub const ARCV_ACTIVATE: usize = 13;
    pub const ARCV_DEACTIVATE: usize = 14;
    pub const CPY: usize = 15;
    pub const CONS: usize = 16;
    pub const DECONS: usize = 17;
    pub const MAPPING_CONS: usize = 18;
    pub const MAPPING_DECONS: usize = 19;
    pub const MAPPING_MOD: usize = 20;
    pub const MAPPING_RETYPE: usize = 21;
}
