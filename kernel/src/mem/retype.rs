use super::KernPage;
use crate::cap::{CapError, CapId, captbl::Captbl};

/// 内存 retype 协作者接口
///
/// 激活类操作消耗的内核内存都从这里获取：由一个页表能力和一个
/// 内核内存能力定位到一页用户供给的物理内存，将其转为内核类型。
/// retype 的具体记账 (物理页引用、类型标记) 不属于本核心。
pub trait KernMem {
    /// 失败时错误原样上抛给调用者
    fn retype_to_kern(
        &mut self,
        ct: &Captbl,
        pgtbl_cap: CapId,
        kmem_cap: CapId,
    ) -> Result<KernPage, CapError>;
}
