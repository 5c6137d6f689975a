//! Bitcoin Core's custom varint (7-bit continuation encoding) and the
//! reversible amount-compression scheme used in `rev*.dat` undo records.
//!
//! This is *not* CompactSize (see [`crate::cursor::ByteCursor::read_compact_size`]);
//! Core varint is big-endian 7-bit groups with a "+1 per continuation byte"
//! rule that makes the encoding canonical.
//! Ref: <https://github.com/bitcoin/bitcoin/blob/master/src/serialize.h>

use crate::cursor::ByteCursor;
use crate::error::{CoreError, CoreResult};

pub fn read_core_varint(cursor: &mut ByteCursor) -> CoreResult<u64> {
    let mut n: u64 = 0;

    loop {
        let b = cursor.read_u8()?;

        if n > (u64::MAX >> 7) {
            return Err(CoreError::VarintOverflow);
        }
        n = (n << 7) | ((b & 0x7F) as u64);

        if b & 0x80 != 0 {
            n = n.checked_add(1).ok_or(CoreError::VarintOverflow)?;
        } else {
            return Ok(n);
        }
    }
}

/// Undoes Bitcoin Core's amount compression (see `compressor.cpp`).
pub fn decompress_amount(x: u64) -> CoreResult<u64> {
    if x == 0 {
        return Ok(0);
    }

    let mut x = x - 1;
    let e = x % 10;
    x /= 10;

    let n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x * 10 + d
    } else {
        x + 1
    };

    n.checked_mul(10u64.pow(e as u32))
        .ok_or(CoreError::AmountOverflow)
}
