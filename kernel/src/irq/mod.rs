pub mod ipi;

pub use ipi::{IpiRings, IpiSender, RingEp};
