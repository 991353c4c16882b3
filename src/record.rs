use crate::Result;

/// Fixed-layout binary (de)serialization contract.
///
/// Higher layers define concrete record layouts; this crate only fixes the
/// contract shape so builder extents can synthesize structured content (see
/// [`crate::RecordExtent`]). Implementations encode into / decode from a byte
/// buffer at offset 0; the caller positions the buffer within the larger
/// address space.
pub trait ByteRecord {
    /// Encoded size in bytes. Must not change between `size` and
    /// `write_to`/`read_from` calls on the same value.
    fn size(&self) -> usize;

    /// Decodes the record from the front of `buf`, returning the number of
    /// bytes consumed.
    fn read_from(&mut self, buf: &[u8]) -> Result<usize>;

    /// Encodes the record into the front of `buf`. `buf` is at least
    /// `self.size()` bytes.
    fn write_to(&self, buf: &mut [u8]) -> Result<()>;
}
