pub const KB: usize = 1024;
pub const MB: usize = KB * KB;
pub const SECTOR_SIZE: usize = 512;

// Default swap area: 1MB, i.e. 256 frame-sized slots.
pub const SWAP_SIZE: usize = MB;
