//! XOR payload masking (RFC 6455 Section 5.3).
//!
//! Masking is involutive: applying the same key twice restores the input.
//! Both functions mutate the caller's buffer in place; a masked buffer must
//! not be reused as plaintext afterward.

/// Scalar byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time XOR masking, processing 4 bytes per iteration with a
/// scalar tail. Produces identical output to [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);

    let (chunks, tail) = data.split_at_mut(data.len() - data.len() % 4);
    for chunk in chunks.chunks_exact_mut(4) {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (i, byte) in tail.iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masking_reversible() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let original = b"Hello, WebSocket!".to_vec();
        let mut data = original.clone();

        apply_mask(&mut data, mask);
        assert_ne!(data, original);

        apply_mask(&mut data, mask);
        assert_eq!(data, original);
    }

    #[test]
    fn test_masking_example_from_rfc() {
        let mask = [0x37, 0xfa, 0x21, 0x3d];
        let mut data = b"Hello".to_vec();

        apply_mask(&mut data, mask);
        assert_eq!(data, vec![0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_masking_empty() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let mut data: Vec<u8> = vec![];
        apply_mask(&mut data, mask);
        assert_eq!(data, Vec::<u8>::new());
    }

    #[test]
    fn test_masking_single_byte() {
        let mask = [0xff, 0x00, 0x00, 0x00];
        let mut data = vec![0xaa];
        apply_mask(&mut data, mask);
        assert_eq!(data, vec![0x55]);
    }

    #[test]
    fn test_masking_aligned() {
        let mask = [0x11, 0x22, 0x33, 0x44];
        let mut data = vec![0x00; 8];
        apply_mask(&mut data, mask);
        assert_eq!(data, vec![0x11, 0x22, 0x33, 0x44, 0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_masking_fast_equivalent() {
        let mask = [0xab, 0xcd, 0xef, 0x12];

        // Sizes straddling the 4-byte word boundary
        for size in [0, 1, 2, 3, 4, 5, 7, 8, 15, 16, 17, 63, 64, 65, 255, 1024] {
            let original: Vec<u8> = (0..size).map(|i| (i & 0xff) as u8).collect();

            let mut data_scalar = original.clone();
            let mut data_fast = original.clone();

            apply_mask(&mut data_scalar, mask);
            apply_mask_fast(&mut data_fast, mask);

            assert_eq!(data_scalar, data_fast, "mismatch at size {size}");
        }
    }

    #[test]
    fn test_masking_fast_reversible() {
        let mask = [0x12, 0x34, 0x56, 0x78];
        let original = b"The quick brown fox jumps over the lazy dog".to_vec();
        let mut data = original.clone();

        apply_mask_fast(&mut data, mask);
        assert_ne!(data, original);

        apply_mask_fast(&mut data, mask);
        assert_eq!(data, original);
    }
}
