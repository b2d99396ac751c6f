/// Error type for block operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The sector is out of bounds (greater than the block size)
    #[error("sector {0} out of bounds")]
    SectorOutOfBounds(u32),
    /// The buffer has an invalid size (not `BLOCK_SECTOR_SIZE`)
    #[error("invalid buffer size {0}")]
    BufferInvalid(usize),
    /// Error reading from the disk
    #[error("error reading from the block device")]
    ReadError,
    /// Error writing to the disk
    #[error("error writing to the block device")]
    WriteError,
    /// Writes to foreign partitions are refused
    #[error("block device is read-only")]
    ReadOnly,
}
