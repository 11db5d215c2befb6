//! First-fit allocation over a single fixed region.
//!
//! [`Arena`] owns the region and every block header inside it. All
//! operations walk or rewrite headers in place; there is no side table.

use std::fmt;

use tracing::debug;

use crate::block::{self, align_up, Blocks, Header, ALIGNMENT, HEADER_BYTES, MIN_BLOCK_BYTES};
use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::handle::ArenaPtr;

/// First-fit allocator over one fixed byte region.
///
/// The region is obtained once and never grows. Blocks tile it exactly;
/// freed blocks are coalesced with both neighbors immediately, so two
/// adjacent free blocks never exist between operations.
pub struct Arena {
    region: Box<[u8]>,
    split_threshold: usize,
    /// Sum of in-use block sizes, headers included.
    used: usize,
    /// Number of in-use blocks.
    live: usize,
}

/// Block size needed for a payload of `size` bytes.
fn block_bytes_for(size: usize) -> Option<usize> {
    align_up(size.max(1), ALIGNMENT)?.checked_add(HEADER_BYTES)
}

impl Arena {
    /// Allocate a zeroed region of `config.region_bytes` bytes and manage it.
    pub fn new(config: ArenaConfig) -> Result<Self, ArenaError> {
        config.validate()?;
        let region = vec![0u8; config.region_bytes].into_boxed_slice();
        Self::from_region(region, &config)
    }

    /// Adopt a region supplied by the caller.
    ///
    /// The region's length takes the place of `config.region_bytes`. Its
    /// previous contents are discarded.
    pub fn from_region(mut region: Box<[u8]>, config: &ArenaConfig) -> Result<Self, ArenaError> {
        let len = region.len();
        ArenaConfig {
            region_bytes: len,
            ..config.clone()
        }
        .validate()?;
        region.fill(0);
        block::write_header(
            &mut region,
            0,
            Header {
                size: len,
                in_use: false,
                prev: None,
            },
        );
        Ok(Self {
            region,
            split_threshold: config.split_threshold,
            used: 0,
            live: 0,
        })
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Allocate at least `size` zeroed bytes at the default alignment.
    pub fn allocate(&mut self, size: usize) -> Result<ArenaPtr, ArenaError> {
        self.allocate_aligned(size, ALIGNMENT)
    }

    /// Allocate at least `size` zeroed bytes whose payload offset is a
    /// multiple of `alignment`.
    ///
    /// `alignment` must be a power of two. Values below [`ALIGNMENT`] are
    /// raised to it.
    pub fn allocate_aligned(
        &mut self,
        size: usize,
        alignment: usize,
    ) -> Result<ArenaPtr, ArenaError> {
        if !alignment.is_power_of_two() {
            return Err(ArenaError::InvalidAlignment { alignment });
        }
        let alignment = alignment.max(ALIGNMENT);
        let Some(needed) = block_bytes_for(size) else {
            return Err(self.out_of_memory(size));
        };

        let mut block = 0;
        while block < self.region.len() {
            let header = block::read_header(&self.region, block);
            if !header.in_use {
                if let Some(start) = Self::fit(block, header.size, needed, alignment) {
                    return Ok(self.claim(block, header, start, needed));
                }
            }
            block += header.size;
        }
        Err(self.out_of_memory(size))
    }

    /// Where a `needed`-byte block with an aligned payload can start
    /// inside the free block `[block, block + size)`.
    ///
    /// A leading gap must be empty or large enough to stand as a free block
    /// of its own; otherwise the next aligned position is tried.
    fn fit(block: usize, size: usize, needed: usize, alignment: usize) -> Option<usize> {
        let end = block + size;
        let mut payload = align_up(block + HEADER_BYTES, alignment)?;
        loop {
            let start = payload - HEADER_BYTES;
            let gap = start - block;
            if gap == 0 || gap >= MIN_BLOCK_BYTES {
                return (start.checked_add(needed)? <= end).then_some(start);
            }
            payload = payload.checked_add(alignment)?;
        }
    }

    /// Carve an in-use block at `start` out of the free block at `block`.
    fn claim(&mut self, block: usize, header: Header, start: usize, needed: usize) -> ArenaPtr {
        let end = block + header.size;
        let mut prev = header.prev;
        if start > block {
            block::write_header(
                &mut self.region,
                block,
                Header {
                    size: start - block,
                    in_use: false,
                    prev,
                },
            );
            prev = Some(block);
        }

        let available = end - start;
        let size = if available - needed >= self.split_threshold {
            needed
        } else {
            available
        };
        block::write_header(
            &mut self.region,
            start,
            Header {
                size,
                in_use: true,
                prev,
            },
        );

        let mut last = start;
        if size < available {
            let tail = start + size;
            block::write_header(
                &mut self.region,
                tail,
                Header {
                    size: available - size,
                    in_use: false,
                    prev: Some(start),
                },
            );
            last = tail;
        }
        self.relink(end, last);

        self.region[start + HEADER_BYTES..start + size].fill(0);
        self.used += size;
        self.live += 1;
        ArenaPtr::for_block(start)
    }

    fn out_of_memory(&self, requested: usize) -> ArenaError {
        let largest_free = self.largest_free_block();
        debug!(requested, largest_free, "arena allocation failed");
        ArenaError::OutOfMemory {
            requested,
            largest_free,
        }
    }

    // ── Release ─────────────────────────────────────────────────

    /// Return an allocation to the arena.
    ///
    /// The block is coalesced with free neighbors on both sides. Freeing a
    /// pointer that is not a live allocation (including a second free of
    /// the same pointer) fails with [`ArenaError::InvalidPointer`] and
    /// leaves the arena untouched.
    pub fn deallocate(&mut self, ptr: ArenaPtr) -> Result<(), ArenaError> {
        let block = self.live_block(ptr)?;
        let header = block::read_header(&self.region, block);
        block::write_header(
            &mut self.region,
            block,
            Header {
                in_use: false,
                ..header
            },
        );
        self.used -= header.size;
        self.live -= 1;
        self.coalesce(block);
        Ok(())
    }

    /// Merge the free block at `block` with free neighbors. Returns the
    /// offset of the merged block.
    fn coalesce(&mut self, block: usize) -> usize {
        let mut header = block::read_header(&self.region, block);
        let next = block + header.size;
        if next < self.region.len() {
            let right = block::read_header(&self.region, next);
            if !right.in_use {
                header.size += right.size;
            }
        }

        let mut start = block;
        if let Some(prev) = header.prev {
            let left = block::read_header(&self.region, prev);
            if !left.in_use {
                start = prev;
                header = Header {
                    size: left.size + header.size,
                    in_use: false,
                    prev: left.prev,
                };
            }
        }

        block::write_header(
            &mut self.region,
            start,
            Header {
                in_use: false,
                ..header
            },
        );
        self.relink(start + header.size, start);
        start
    }

    /// Point the block at `block`, if there is one, back at `prev`.
    fn relink(&mut self, block: usize, prev: usize) {
        if block < self.region.len() {
            let mut header = block::read_header(&self.region, block);
            header.prev = Some(prev);
            block::write_header(&mut self.region, block, header);
        }
    }

    /// Resolve `ptr` to the offset of its in-use block, checking the header
    /// and both neighbor links.
    fn live_block(&self, ptr: ArenaPtr) -> Result<usize, ArenaError> {
        let invalid = || ArenaError::InvalidPointer {
            offset: ptr.offset(),
        };
        let len = self.region.len();
        let block = ptr.block().ok_or_else(invalid)?;
        if block % ALIGNMENT != 0 || block.saturating_add(MIN_BLOCK_BYTES) > len {
            return Err(invalid());
        }

        let header = block::read_header(&self.region, block);
        if !header.in_use
            || header.size < MIN_BLOCK_BYTES
            || header.size % ALIGNMENT != 0
            || header.size > len - block
        {
            return Err(invalid());
        }

        match header.prev {
            None if block != 0 => return Err(invalid()),
            Some(prev) => {
                if prev >= block || prev % ALIGNMENT != 0 {
                    return Err(invalid());
                }
                if prev + block::read_header(&self.region, prev).size != block {
                    return Err(invalid());
                }
            }
            None => {}
        }

        let next = block + header.size;
        if next < len && block::read_header(&self.region, next).prev != Some(block) {
            return Err(invalid());
        }
        Ok(block)
    }

    // ── Resize ──────────────────────────────────────────────────

    /// Resize an allocation, preserving the first `min(old, new)` payload
    /// bytes.
    ///
    /// Shrinking splits the tail off in place. Growing first tries to
    /// absorb a free right neighbor, then to merge with a free left
    /// neighbor (moving the payload down). Failing both, a fresh block
    /// (default alignment) is allocated, the payload copied, and the old
    /// block freed. On failure the original allocation is left untouched.
    /// Bytes gained by growth are zero.
    pub fn reallocate(&mut self, ptr: ArenaPtr, new_size: usize) -> Result<ArenaPtr, ArenaError> {
        let block = self.live_block(ptr)?;
        let header = block::read_header(&self.region, block);
        let Some(needed) = block_bytes_for(new_size) else {
            return Err(self.out_of_memory(new_size));
        };

        if needed <= header.size {
            let remainder = header.size - needed;
            if remainder >= self.split_threshold {
                block::write_header(
                    &mut self.region,
                    block,
                    Header {
                        size: needed,
                        ..header
                    },
                );
                let tail = block + needed;
                block::write_header(
                    &mut self.region,
                    tail,
                    Header {
                        size: remainder,
                        in_use: false,
                        prev: Some(block),
                    },
                );
                self.relink(tail + remainder, tail);
                self.used -= remainder;
                self.coalesce(tail);
            }
            return Ok(ptr);
        }

        let next = block + header.size;
        if next < self.region.len() {
            let right = block::read_header(&self.region, next);
            let combined = header.size + right.size;
            if !right.in_use && combined >= needed {
                let size = if combined - needed >= self.split_threshold {
                    needed
                } else {
                    combined
                };
                block::write_header(&mut self.region, block, Header { size, ..header });
                if size < combined {
                    let tail = block + size;
                    block::write_header(
                        &mut self.region,
                        tail,
                        Header {
                            size: combined - size,
                            in_use: false,
                            prev: Some(block),
                        },
                    );
                    self.relink(block + combined, tail);
                } else {
                    self.relink(block + combined, block);
                }
                self.region[next..block + size].fill(0);
                self.used += size - header.size;
                return Ok(ptr);
            }
        }

        if let Some(moved) = self.grow_into_left(block, header, needed) {
            return Ok(moved);
        }

        let fresh = self.allocate(new_size)?;
        let old_payload = header.size - HEADER_BYTES;
        self.copy_within(ptr, fresh, old_payload);
        self.deallocate(ptr)?;
        Ok(fresh)
    }

    /// Grow the in-use block at `block` by merging it with a free left
    /// neighbor and any free right neighbor. The payload moves down to the
    /// merged block's start. Returns `None`, changing nothing, if the
    /// merged span is still smaller than `needed`.
    fn grow_into_left(
        &mut self,
        block: usize,
        header: Header,
        needed: usize,
    ) -> Option<ArenaPtr> {
        let start = header.prev?;
        let left = block::read_header(&self.region, start);
        if left.in_use {
            return None;
        }
        let next = block + header.size;
        let right = if next < self.region.len() {
            let right = block::read_header(&self.region, next);
            if right.in_use {
                0
            } else {
                right.size
            }
        } else {
            0
        };
        let combined = left.size + header.size + right;
        if combined < needed {
            return None;
        }

        let old_payload = header.size - HEADER_BYTES;
        self.region.copy_within(
            block + HEADER_BYTES..block + header.size,
            start + HEADER_BYTES,
        );
        let size = if combined - needed >= self.split_threshold {
            needed
        } else {
            combined
        };
        self.region[start + HEADER_BYTES + old_payload..start + size].fill(0);
        block::write_header(
            &mut self.region,
            start,
            Header {
                size,
                in_use: true,
                prev: left.prev,
            },
        );
        if size < combined {
            let tail = start + size;
            block::write_header(
                &mut self.region,
                tail,
                Header {
                    size: combined - size,
                    in_use: false,
                    prev: Some(start),
                },
            );
            self.relink(start + combined, tail);
        } else {
            self.relink(start + combined, start);
        }
        self.used += size - header.size;
        Some(ArenaPtr::for_block(start))
    }

    // ── Accounting ──────────────────────────────────────────────

    /// Usable payload bytes of a live allocation. May exceed the size
    /// originally requested.
    pub fn usable_size(&self, ptr: ArenaPtr) -> Result<usize, ArenaError> {
        Ok(self.block_size(ptr)? - HEADER_BYTES)
    }

    /// Full block size of a live allocation, header included.
    pub fn block_size(&self, ptr: ArenaPtr) -> Result<usize, ArenaError> {
        let block = self.live_block(ptr)?;
        Ok(block::read_header(&self.region, block).size)
    }

    /// Total size of the region in bytes.
    pub fn region_bytes(&self) -> usize {
        self.region.len()
    }

    /// Bytes held by in-use blocks, headers included.
    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Bytes held by free blocks, headers included.
    pub fn free_bytes(&self) -> usize {
        self.region.len() - self.used
    }

    /// Number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.live
    }

    /// Payload capacity of the largest free block, or 0 if none is free.
    pub fn largest_free_block(&self) -> usize {
        self.blocks()
            .filter(|b| !b.in_use)
            .map(|b| b.payload_bytes())
            .max()
            .unwrap_or(0)
    }

    /// Blocks in address order.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            region: &self.region,
            next: 0,
        }
    }

    /// Walk every header and check the tiling invariants: sizes are
    /// aligned and in bounds, previous links match the walk, no two free
    /// blocks are adjacent, and the usage counters agree with the headers.
    pub fn verify(&self) -> Result<(), ArenaError> {
        let len = self.region.len();
        let corrupted = |offset, reason| ArenaError::Corrupted { offset, reason };
        let mut block = 0;
        let mut prev = None;
        let mut prev_free = false;
        let mut used = 0;
        let mut live = 0;

        while block < len {
            if block + HEADER_BYTES > len {
                return Err(corrupted(block, "header overruns region"));
            }
            let header = block::read_header(&self.region, block);
            if header.size < MIN_BLOCK_BYTES || header.size % ALIGNMENT != 0 {
                return Err(corrupted(block, "bad block size"));
            }
            if header.size > len - block {
                return Err(corrupted(block, "block overruns region"));
            }
            if header.prev != prev {
                return Err(corrupted(block, "broken previous link"));
            }
            if !header.in_use && prev_free {
                return Err(corrupted(block, "adjacent free blocks"));
            }
            if header.in_use {
                used += header.size;
                live += 1;
            }
            prev_free = !header.in_use;
            prev = Some(block);
            block += header.size;
        }

        if used != self.used {
            return Err(corrupted(0, "used byte count disagrees with headers"));
        }
        if live != self.live {
            return Err(corrupted(0, "live allocation count disagrees with headers"));
        }
        Ok(())
    }

    // ── Payload access ──────────────────────────────────────────
    //
    // These do not re-validate the block header; callers hold handles
    // they obtained from this arena. Out-of-region ranges panic.

    /// `len` payload bytes of `ptr`.
    pub fn bytes(&self, ptr: ArenaPtr, len: usize) -> &[u8] {
        &self.region[ptr.offset()..ptr.offset() + len]
    }

    /// Mutable view of `len` payload bytes of `ptr`.
    pub fn bytes_mut(&mut self, ptr: ArenaPtr, len: usize) -> &mut [u8] {
        &mut self.region[ptr.offset()..ptr.offset() + len]
    }

    /// Read the little-endian word at word index `index` of the payload.
    pub fn read_word(&self, ptr: ArenaPtr, index: usize) -> u64 {
        block::load_word(&self.region, ptr.offset() + index * 8)
    }

    /// Write the little-endian word at word index `index` of the payload.
    pub fn write_word(&mut self, ptr: ArenaPtr, index: usize, value: u64) {
        block::store_word(&mut self.region, ptr.offset() + index * 8, value);
    }

    /// Copy `len` payload bytes from `src` to `dst`. The ranges may overlap.
    pub fn copy_within(&mut self, src: ArenaPtr, dst: ArenaPtr, len: usize) {
        self.region
            .copy_within(src.offset()..src.offset() + len, dst.offset());
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("region_bytes", &self.region.len())
            .field("used", &self.used)
            .field("live", &self.live)
            .finish()
    }
}
