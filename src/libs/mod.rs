#[macro_use]
pub mod int_like;

pub mod cpumask;
pub mod spinlock;
