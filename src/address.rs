//! Packed section offsets and bulk byte movement inside a store.

use crate::error::Result;
use crate::store::ByteStore;
use std::cmp::min;
use tracing::trace;

/// Default size of the staging buffer used by [`copy_data`].
pub const COPY_BUFFER_SIZE: usize = 128 * 1024;

/// Strips the executable flag from a packed section offset.
pub fn to_address(raw: u32) -> u32 {
    raw & !1
}

/// Strips the executable flag from `raw` and adds `extra`.
pub fn to_address_with(raw: u32, extra: u32) -> u64 {
    u64::from(to_address(raw)) + u64::from(extra)
}

/// Builds a packed section offset from an address and an executable flag.
pub fn pack_section_offset(address: u32, executable: bool) -> u32 {
    to_address(address) | executable as u32
}

/// Copies `amount` bytes from `src` to `dst` through a staging buffer of at most
/// `buffer_size` bytes.
///
/// Overlapping ranges are handled like `memmove`. When the destination starts inside the
/// source range the copy walks backwards from the tail in chunks no larger than the distance
/// between the two ranges.
pub fn copy_data<S: ByteStore + ?Sized>(
    store: &mut S,
    src: u64,
    dst: u64,
    amount: u64,
    buffer_size: usize,
) -> Result<()> {
    if amount == 0 || src == dst {
        return Ok(());
    }
    let buffer_size = buffer_size.max(1) as u64;

    if dst > src && dst - src < amount {
        let chunk = min(dst - src, buffer_size);
        let mut buffer = vec![0u8; min(chunk, amount) as usize];
        let mut remaining = amount;
        while remaining > 0 {
            let n = min(chunk, remaining);
            remaining -= n;
            let buf = &mut buffer[..n as usize];
            store.read_at(src + remaining, buf)?;
            store.write_at(dst + remaining, buf)?;
            trace!(from = src + remaining, to = dst + remaining, len = n, "Copied chunk backwards");
        }
    } else {
        let mut buffer = vec![0u8; min(buffer_size, amount) as usize];
        let mut done = 0;
        while done < amount {
            let n = min(buffer_size, amount - done);
            let buf = &mut buffer[..n as usize];
            store.read_at(src + done, buf)?;
            store.write_at(dst + done, buf)?;
            trace!(from = src + done, to = dst + done, len = n, "Copied chunk");
            done += n;
        }
    }
    Ok(())
}
