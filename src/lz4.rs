//! Single-block LZ4 decoder.
//!
//! The pack's texture and skeleton containers store one raw LZ4 block
//! (no frame envelope) prefixed with an explicit decompressed size, so
//! this decoder takes that size as an argument instead of discovering
//! it. Decoding is best-effort: truncated input or an out-of-range
//! back-offset stop the loop and return whatever was produced, and
//! callers that treat the result as authoritative compare its length
//! against the declared size.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

const MIN_MATCH: usize = 4;

/// Decode one raw LZ4 block into at most `decompressed_len` bytes.
pub fn decompress_block(src: &[u8], decompressed_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(decompressed_len);
    let mut i = 0;

    while i < src.len() && out.len() < decompressed_len {
        let token = src[i];
        i += 1;

        let mut literal_len = (token >> 4) as usize;
        if literal_len == 15 {
            literal_len += read_linked(src, &mut i);
        }

        if literal_len > 0 {
            let literal_len = literal_len
                .min(src.len() - i)
                .min(decompressed_len - out.len());
            out.extend_from_slice(&src[i..i + literal_len]);
            i += literal_len;
        }

        if i + 2 > src.len() || out.len() >= decompressed_len {
            break;
        }
        let offset = LittleEndian::read_u16(&src[i..i + 2]) as usize;
        i += 2;
        if offset == 0 || offset > out.len() {
            break;
        }

        let mut match_len = (token & 0x0F) as usize;
        if match_len == 15 {
            match_len += read_linked(src, &mut i);
        }
        match_len += MIN_MATCH;

        // Matches may overlap the bytes they produce, so the copy has
        // to run byte-by-byte, never block-wise.
        let start = out.len() - offset;
        for j in 0..match_len {
            if out.len() >= decompressed_len {
                break;
            }
            let b = out[start + j];
            out.push(b);
        }
    }

    out
}

/// Decode a block carried in the shared 8-byte size envelope:
/// `i32 decompressed_size, i32 compressed_size`, then the block.
pub fn decompress_sized(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::BadLz4Envelope("shorter than the 8-byte header"));
    }
    let decompressed_len = LittleEndian::read_i32(&data[..4]);
    let compressed_len = LittleEndian::read_i32(&data[4..8]);
    if decompressed_len <= 0 || compressed_len < 0 {
        return Err(Error::BadLz4Envelope("non-positive size fields"));
    }
    let compressed_len = compressed_len as usize;
    if 8 + compressed_len > data.len() {
        return Err(Error::BadLz4Envelope("compressed block exceeds buffer"));
    }
    Ok(decompress_block(
        &data[8..8 + compressed_len],
        decompressed_len as usize,
    ))
}

/// Linked-byte length extension: each byte is added to the running
/// total and a byte other than 255 terminates the sequence.
fn read_linked(src: &[u8], i: &mut usize) -> usize {
    let mut total = 0usize;
    while *i < src.len() {
        let b = src[*i];
        *i += 1;
        total += b as usize;
        if b != 255 {
            break;
        }
    }
    total
}
