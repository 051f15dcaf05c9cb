use crate::cap::CapError;
use crate::cap::invoke::{self, KernCtx};
use crate::hart::Hart;
use crate::trap::TrapContext;

/// 系统调用入口约定
///
/// ABI:
/// a0: 能力 ID (0 为保留的默认返回能力)
/// a1: 操作选择子；默认返回路径上携带回传给调用者的返回字
/// a2-a5: 至多四个操作数字
/// 返回：结果写入 a0；发生线程切换时 a0 属于被切入线程的帧
pub mod errcode {
    pub const SUCCESS: isize = 0;
    /// 能力 ID 在表中无条目
    pub const ENOENT: isize = -2;
    /// 目标保护域已被销毁
    pub const EFAULT: isize = -14;
    /// 类型不符 / 核亲和不符 / 参数非法
    pub const EINVAL: isize = -22;
    /// retype 协作者资源耗尽
    pub const ENOMEM: isize = -12;
    /// 可达但尚未实现的路径
    pub const ENOSYS: isize = -38;
}

/// 错误到返回码的唯一转换点
pub fn encode(e: CapError) -> isize {
    match e {
        CapError::NotFound => errcode::ENOENT,
        CapError::InvalidCap => errcode::EINVAL,
        CapError::Fault => errcode::EFAULT,
        CapError::NoMem => errcode::ENOMEM,
        CapError::Unimplemented => errcode::ENOSYS,
    }
}

/// 陷阱处理程序的系统调用分支由此进入
/// 返回值告知恢复路径被切入线程是否带 PREEMPTED 标记
pub fn sysenter(k: &mut KernCtx, hart: &mut Hart, regs: &mut TrapContext) -> usize {
    invoke::dispatch(k, hart, regs)
}
