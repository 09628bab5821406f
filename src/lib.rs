#![cfg_attr(not(test), no_std)]
// clippy的配置
#![deny(clippy::all)]
#![allow(clippy::bad_bit_mask)]
// 我们允许在函数中使用return语句（尤其是长函数时，我们推荐这么做）
#![allow(clippy::let_and_return)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::needless_return)]
#![allow(clippy::upper_case_acronyms)]

#[cfg(test)]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;

#[macro_use]
pub mod libs;
pub mod evtchn;
pub mod hypercall;
pub mod irqchip;
pub mod irqcore;
pub mod smp;
