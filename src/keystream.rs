//! XOR keystream used for the encrypted pack variant.
//!
//! The pack is random-access, so the keystream is keyed by absolute
//! file offset: any sub-range decrypts correctly without prior context.

const SEED: u32 = 0x24D1C;
const MULTIPLIER: u32 = 0x41C64E6D;
pub const KEY_SIZE: usize = 0x81;

const fn build_key() -> [u8; KEY_SIZE] {
    let mut key = [0u8; KEY_SIZE];
    let mut state = SEED;
    let mut i = 0;
    while i < KEY_SIZE {
        state = state.wrapping_mul(MULTIPLIER) & 0x7FFF_FFFF;
        key[i] = (state >> 16) as u8;
        i += 1;
    }
    key
}

pub const KEY: [u8; KEY_SIZE] = build_key();

/// XOR `buf` in place with the keystream, phased by the absolute file
/// offset the buffer was read from. Applying twice is the identity.
pub fn apply(buf: &mut [u8], file_offset: u64) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b ^= KEY[((file_offset as usize).wrapping_add(i)) % KEY_SIZE];
    }
}

/// Decrypt a single byte without materializing a buffer. The scanner
/// uses this to probe for record markers.
pub fn decrypt_byte(b: u8, file_offset: u64) -> u8 {
    b ^ KEY[(file_offset as usize) % KEY_SIZE]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_key_bytes_match_known_vector() {
        // state1 = 0x24D1C * 0x41C64E6D mod 2^31 = 0x674BF294,
        // key[0] = (state1 >> 16) & 0xFF = 0x67.
        assert_eq!(
            &KEY[..16],
            &[
                0x67, 0x75, 0x4E, 0xBC, 0x89, 0xF5, 0x66, 0xDD, 0x34, 0x6E, 0x12, 0xA3, 0xC4,
                0x77, 0x25, 0x57
            ]
        );
    }

    #[test]
    fn apply_twice_is_identity() {
        let original: Vec<u8> = (0..=255u8).cycle().take(600).collect();
        for offset in [0u64, 1, 128, 129, 130, 12345] {
            let mut buf = original.clone();
            apply(&mut buf, offset);
            assert_ne!(buf, original);
            apply(&mut buf, offset);
            assert_eq!(buf, original);
        }
    }

    #[test]
    fn apply_is_phased_by_absolute_offset() {
        let mut whole = vec![0u8; 300];
        apply(&mut whole, 0);

        // Decrypting a sub-range with its own absolute offset must agree
        // with decrypting the whole buffer at once.
        let mut tail = vec![0u8; 100];
        apply(&mut tail, 200);
        assert_eq!(&whole[200..], &tail[..]);
    }

    #[test]
    fn single_byte_probe_matches_apply() {
        let mut buf = [0xAAu8; 16];
        apply(&mut buf, 777);
        for (i, &b) in buf.iter().enumerate() {
            assert_eq!(decrypt_byte(0xAA, 777 + i as u64), b);
        }
    }
}
