//! In-band block headers.
//!
//! Every block starts with a 16-byte header of two little-endian words:
//!
//! | word | contents                                              |
//! |------|-------------------------------------------------------|
//! | 0    | block size in bytes (header included), in-use in bit 0 |
//! | 1    | previous block offset + 1, or 0 for the first block    |
//!
//! Sizes are multiples of [`ALIGNMENT`], so bit 0 of the size word is free
//! for the in-use flag.

/// Size of a block header in bytes.
pub const HEADER_BYTES: usize = 16;

/// Default payload alignment and block size granularity.
pub const ALIGNMENT: usize = 16;

/// Smallest block the arena creates: a header plus one aligned unit.
pub const MIN_BLOCK_BYTES: usize = HEADER_BYTES + ALIGNMENT;

const IN_USE: u64 = 1;

/// Decoded block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Header {
    pub(crate) size: usize,
    pub(crate) in_use: bool,
    pub(crate) prev: Option<usize>,
}

pub(crate) fn load_word(region: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&region[at..at + 8]);
    u64::from_le_bytes(word)
}

pub(crate) fn store_word(region: &mut [u8], at: usize, value: u64) {
    region[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn read_header(region: &[u8], block: usize) -> Header {
    let size_word = load_word(region, block);
    let prev_word = load_word(region, block + 8);
    Header {
        size: (size_word & !IN_USE) as usize,
        in_use: size_word & IN_USE != 0,
        prev: (prev_word as usize).checked_sub(1),
    }
}

pub(crate) fn write_header(region: &mut [u8], block: usize, header: Header) {
    let flag = if header.in_use { IN_USE } else { 0 };
    store_word(region, block, header.size as u64 | flag);
    store_word(region, block + 8, header.prev.map_or(0, |p| p as u64 + 1));
}

/// Round `value` up to a multiple of `align` (a power of two).
pub(crate) fn align_up(value: usize, align: usize) -> Option<usize> {
    value.checked_add(align - 1).map(|v| v & !(align - 1))
}

/// Public view of one block, as reported by [`Arena::blocks`](crate::Arena::blocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the block header within the region.
    pub offset: usize,
    /// Block size in bytes, header included.
    pub size: usize,
    /// Whether the block is allocated.
    pub in_use: bool,
}

impl BlockInfo {
    /// Payload offset of the block.
    pub fn payload_offset(&self) -> usize {
        self.offset + HEADER_BYTES
    }

    /// Usable payload bytes of the block.
    pub fn payload_bytes(&self) -> usize {
        self.size - HEADER_BYTES
    }
}

/// Iterator over the blocks of a region in address order.
///
/// Stops early at a header whose size cannot be walked, which only
/// happens in a corrupted region.
pub struct Blocks<'a> {
    pub(crate) region: &'a [u8],
    pub(crate) next: usize,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        if self.next + HEADER_BYTES > self.region.len() {
            return None;
        }
        let header = read_header(self.region, self.next);
        let info = BlockInfo {
            offset: self.next,
            size: header.size,
            in_use: header.in_use,
        };
        if header.size < MIN_BLOCK_BYTES {
            self.next = self.region.len();
        } else {
            self.next = self.next.saturating_add(header.size);
        }
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut region = vec![0u8; 64];
        let header = Header {
            size: 48,
            in_use: true,
            prev: Some(0),
        };
        write_header(&mut region, 16, header);
        assert_eq!(read_header(&region, 16), header);

        let first = Header {
            size: 16,
            in_use: false,
            prev: None,
        };
        write_header(&mut region, 0, first);
        assert_eq!(read_header(&region, 0), first);
    }

    #[test]
    fn align_up_rounds_to_power_of_two() {
        assert_eq!(align_up(0, 16), Some(0));
        assert_eq!(align_up(1, 16), Some(16));
        assert_eq!(align_up(48, 16), Some(48));
        assert_eq!(align_up(49, 64), Some(64));
        assert_eq!(align_up(usize::MAX, 16), None);
    }
}
