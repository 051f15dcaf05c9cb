use super::{KernPage, PhysAddr, VirtAddr};
use crate::cap::CapError;

/// 页表根节点的物理地址
pub type PgtblRoot = PhysAddr;

/// PGTBL 能力的层级标记
/// Root 指整棵页表的根；Pte 指一页尚未挂接的页表项叶子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgtblLvl {
    Root,
    Pte,
}

/// 页表协作者接口
/// 地址空间的构建与映射记账在外部，这里只经由能力操作转发
pub trait PgtblOps {
    /// 用一页内核内存建一棵新页表，拷贝 copy_from 中的内核映射
    fn init_root(&mut self, page: KernPage, copy_from: PgtblRoot) -> Result<PgtblRoot, CapError>;

    /// 把一页内核内存初始化为页表项叶子
    fn init_pte(&mut self, page: KernPage) -> Result<PgtblRoot, CapError>;

    /// 把叶子挂接到 root 页表的 at 虚拟地址处
    fn cons(&mut self, root: PgtblRoot, pte: PgtblRoot, at: VirtAddr) -> Result<(), CapError>;

    /// 把 from 页表 from_addr 处的映射复制到 to 页表 to_addr 处
    /// 两个映射随后独立指向同一物理页
    fn copy_mapping(
        &mut self,
        from: PgtblRoot,
        from_addr: VirtAddr,
        to: PgtblRoot,
        to_addr: VirtAddr,
    ) -> Result<(), CapError>;

    /// 删除 root 页表 addr 处的单页映射
    fn mapping_del(&mut self, root: PgtblRoot, addr: VirtAddr) -> Result<(), CapError>;
}
