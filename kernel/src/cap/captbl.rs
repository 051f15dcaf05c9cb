use super::{CapError, CapId, CapKind, CapType};
use crate::mem::{KernNode, KernPage, PGSIZE, PhysAddr};
use alloc::vec::Vec;

/// 能力表句柄：表仓中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptblId(pub usize);

/// 槽位的名义占用 (字节)，决定一个叶子节点覆盖多少 ID
pub const CAPTBL_SLOT_SZ: usize = 64;
/// 最小扩展单元：半页节点
pub const CAPTBL_NODE_SZ: usize = PGSIZE / 2;
/// 每个叶子节点的槽数
pub const CAPTBL_LEAF_SLOTS: usize = CAPTBL_NODE_SZ / CAPTBL_SLOT_SZ;
/// 根节点条目数 (每条目一个指针字)
pub const CAPTBL_ROOT_ENTS: usize = CAPTBL_NODE_SZ / core::mem::size_of::<usize>();
/// 两级结构的 ID 上界
pub const CAPTBL_MAX_ID: CapId = CAPTBL_ROOT_ENTS * CAPTBL_LEAF_SLOTS;

/// 叶子节点：一段半页后备内存上的定长槽数组
struct Leaf {
    base: PhysAddr,
    slots: [CapType; CAPTBL_LEAF_SLOTS],
}

impl Leaf {
    fn new(node: KernNode) -> Self {
        Self { base: node.addr(), slots: [CapType::Empty; CAPTBL_LEAF_SLOTS] }
    }
}

/// 能力表：两级定扇出结构
///
/// 根节点按 ID 高位索引到叶子，叶子按低位索引到槽。
/// 建表消耗一页 retype 内存：前半页作根节点，后半页作首个叶子，
/// 新表即刻可用 (覆盖 ID 0..CAPTBL_LEAF_SLOTS)。
pub struct Captbl {
    base: PhysAddr,
    root: [Option<u16>; CAPTBL_ROOT_ENTS],
    leaves: Vec<Leaf>,
}

impl Captbl {
    pub fn create(page: KernPage) -> Self {
        let (lo, hi) = page.split();
        let mut ct =
            Self { base: lo.addr(), root: [None; CAPTBL_ROOT_ENTS], leaves: Vec::new() };
        ct.root[0] = Some(0);
        ct.leaves.push(Leaf::new(hi));
        ct
    }

    #[inline(always)]
    fn index(id: CapId) -> Result<(usize, usize), CapError> {
        if id >= CAPTBL_MAX_ID {
            return Err(CapError::NotFound);
        }
        Ok((id / CAPTBL_LEAF_SLOTS, id % CAPTBL_LEAF_SLOTS))
    }

    fn slot(&self, id: CapId) -> Result<&CapType, CapError> {
        let (ri, li) = Self::index(id)?;
        let leaf = self.root[ri].ok_or(CapError::NotFound)?;
        Ok(&self.leaves[leaf as usize].slots[li])
    }

    fn slot_mut(&mut self, id: CapId) -> Result<&mut CapType, CapError> {
        let (ri, li) = Self::index(id)?;
        let leaf = self.root[ri].ok_or(CapError::NotFound)?;
        Ok(&mut self.leaves[leaf as usize].slots[li])
    }

    /// 点查：缺级、越界或空槽一律 NotFound
    pub fn lookup(&self, id: CapId) -> Result<&CapType, CapError> {
        let slot = self.slot(id)?;
        if let CapType::Empty = slot {
            return Err(CapError::NotFound);
        }
        Ok(slot)
    }

    /// 需要原地改写负载的路径用 (接收端未决计数)
    pub fn lookup_mut(&mut self, id: CapId) -> Result<&mut CapType, CapError> {
        let slot = self.slot_mut(id)?;
        if let CapType::Empty = slot {
            return Err(CapError::NotFound);
        }
        Ok(slot)
    }

    /// 槽位激活：目标槽必须为空
    pub fn install(&mut self, id: CapId, cap: CapType) -> Result<(), CapError> {
        let slot = self.slot_mut(id)?;
        if !matches!(slot, CapType::Empty) {
            return Err(CapError::InvalidCap);
        }
        *slot = cap;
        Ok(())
    }

    /// 槽位失活：类型标签必须与操作预期一致，ID 随后可复用
    /// (被引用保护域的回收/世代翻转是外部的事)
    pub fn clear(&mut self, id: CapId, expect: CapKind) -> Result<(), CapError> {
        let slot = self.slot_mut(id)?;
        if slot.kind() != expect {
            return Err(CapError::InvalidCap);
        }
        *slot = CapType::Empty;
        Ok(())
    }

    /// 树扩展：把一个半页节点装为 id 起始的新叶子
    /// id 必须对齐到叶子边界，且该级尚未存在
    pub fn expand(&mut self, id: CapId, node: KernNode) -> Result<(), CapError> {
        if id % CAPTBL_LEAF_SLOTS != 0 {
            return Err(CapError::InvalidCap);
        }
        let (ri, _) = Self::index(id).map_err(|_| CapError::InvalidCap)?;
        if self.root[ri].is_some() {
            return Err(CapError::InvalidCap);
        }
        self.root[ri] = Some(self.leaves.len() as u16);
        self.leaves.push(Leaf::new(node));
        Ok(())
    }

    pub fn base_addr(&self) -> PhysAddr {
        self.base
    }

    /// id 所在叶子节点的后备地址 (测试与诊断用)
    pub fn leaf_addr(&self, id: CapId) -> Result<PhysAddr, CapError> {
        let (ri, _) = Self::index(id)?;
        let leaf = self.root[ri].ok_or(CapError::NotFound)?;
        Ok(self.leaves[leaf as usize].base)
    }
}

/// 表仓：句柄在进程生命周期内稳定，销毁回收由组件拆除流程在外部处理
pub struct CaptblSet {
    tbls: Vec<Captbl>,
}

impl CaptblSet {
    pub const fn new() -> Self {
        Self { tbls: Vec::new() }
    }

    /// 建新表 (CAPTBL_ACTIVATE / 启动路径)
    pub fn create(&mut self, page: KernPage) -> CaptblId {
        let id = CaptblId(self.tbls.len());
        self.tbls.push(Captbl::create(page));
        id
    }

    pub fn get(&self, id: CaptblId) -> &Captbl {
        &self.tbls[id.0]
    }

    pub fn get_mut(&mut self, id: CaptblId) -> &mut Captbl {
        &mut self.tbls[id.0]
    }

    /// 跨表裸拷贝：逐字复制能力记录，不是引用计数递增
    /// 两个槽位随后独立指向同一底层资源
    pub fn copy(
        &mut self,
        from: CaptblId,
        from_id: CapId,
        to: CaptblId,
        to_id: CapId,
    ) -> Result<(), CapError> {
        let rec = *self.get(from).lookup(from_id)?;
        self.get_mut(to).install(to_id, rec)
    }
}

impl Default for CaptblSet {
    fn default() -> Self {
        Self::new()
    }
}
