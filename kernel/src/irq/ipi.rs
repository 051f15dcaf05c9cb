use crate::cap::CapId;
use crate::cap::captbl::CaptblId;
use crate::hart::{CoreId, MAX_HARTS};
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 核间中断发送协作者 (硬件信号本身在外部，riscv64 上走 SBI)
pub trait IpiSender {
    fn send_ipi(&self, core: CoreId);
}

/// 环槽中记录的通知端点：目标组件的能力表 + 其中的接收能力 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingEp {
    pub captbl: CaptblId,
    pub cap: CapId,
}

#[inline(always)]
fn pack(ep: RingEp) -> u64 {
    ((ep.captbl.0 as u64) << 32) | ep.cap as u64
}

#[inline(always)]
fn unpack(raw: u64) -> RingEp {
    RingEp { captbl: CaptblId((raw >> 32) as usize), cap: (raw & 0xFFFF_FFFF) as usize }
}

/// 一对 (源核, 目标核) 的通知槽，独占一条缓存行
///
/// 写侧纪律：sender 与 ep 只由源核写；receiver 只由目标核写。
/// 计数器不等即有通知待处理；同一源核在一次扫描前的多次发送
/// 合并为一个事件 (至少一次，而非恰好 N 次)。
#[repr(align(64))]
pub struct XcoreRing {
    sender: AtomicU64,
    receiver: AtomicU64,
    ep: AtomicU64,
}

impl XcoreRing {
    const fn new() -> Self {
        Self { sender: AtomicU64::new(0), receiver: AtomicU64::new(0), ep: AtomicU64::new(0) }
    }
}

/// 单个目标核看到的所有来源槽，扫描起点轮转以保证公平
pub struct IpiDest {
    start: AtomicUsize,
    source: [XcoreRing; MAX_HARTS],
}

/// 跨核通知环：每 (源核, 目标核) 对一个固定槽
pub struct IpiRings {
    dest: [IpiDest; MAX_HARTS],
}

impl IpiRings {
    pub const fn new() -> Self {
        Self {
            dest: [const {
                IpiDest {
                    start: AtomicUsize::new(0),
                    source: [const { XcoreRing::new() }; MAX_HARTS],
                }
            }; MAX_HARTS],
        }
    }

    /// 发送侧：登记端点后推进发送计数
    /// ep 先于计数发布 (Release)，接收侧 Acquire 读到计数后必能看到 ep
    pub fn publish(&self, from: CoreId, to: CoreId, ep: RingEp) {
        let ring = &self.dest[to].source[from];
        ring.ep.store(pack(ep), Ordering::Relaxed);
        ring.sender.fetch_add(1, Ordering::Release);
    }

    /// 接收侧：完整扫一遍所有来源槽，对每个计数不等的槽产生一个事件
    /// 只在目标核的中断处理中调用，一轮扫描内跑完不被打断
    pub fn scan(&self, me: CoreId, mut deliver: impl FnMut(CoreId, RingEp)) {
        let rings = &self.dest[me];
        let start = rings.start.load(Ordering::Relaxed);
        rings.start.store((start + 1) % MAX_HARTS, Ordering::Relaxed);

        // 前半段
        for idx in start..MAX_HARTS {
            Self::drain(&rings.source[idx], idx, &mut deliver);
        }
        // 后半段 (回绕)
        for idx in 0..start {
            Self::drain(&rings.source[idx], idx, &mut deliver);
        }
    }

    fn drain(ring: &XcoreRing, src: CoreId, deliver: &mut impl FnMut(CoreId, RingEp)) {
        let snd = ring.sender.load(Ordering::Acquire);
        if snd != ring.receiver.load(Ordering::Relaxed) {
            let ep = unpack(ring.ep.load(Ordering::Relaxed));
            ring.receiver.store(snd, Ordering::Relaxed);
            deliver(src, ep);
        }
    }
}

impl Default for IpiRings {
    fn default() -> Self {
        Self::new()
    }
}
