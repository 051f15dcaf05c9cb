#![cfg_attr(not(test), no_std)]

//! 能力调用核心 (Capability Invocation Core)
//!
//! 内核中最热的路径：把用户态陷入携带的能力 ID 解析为一次特权操作
//! (同步跨域调用 / 线程切换 / 跨核通知 / 能力表结构修改)。
//! 启动、调度策略、页表内部实现与寄存器保存原语都由外部协作者提供，
//! 这里只负责能力校验、控制权转移本身与结果回写。

extern crate alloc;

pub mod cap;
pub mod hart;
pub mod irq;
pub mod liveness;
pub mod mem;
pub mod printk;
pub mod proc;
pub mod trap;

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
pub mod sbi;

#[cfg(test)]
mod tests;
