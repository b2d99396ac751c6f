#![no_std]

pub mod bit_array;
pub mod logger;
pub mod mem;
pub mod paging;
pub mod sizes;
