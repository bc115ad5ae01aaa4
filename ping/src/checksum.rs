//! Internet checksum (RFC 1071)

/// Computes the Internet checksum of `data`.
///
/// Byte pairs are summed as little-endian words and the complemented result
/// is byte-swapped, so the returned value is already in network order:
/// `checksum(data).to_be_bytes()` is exactly what goes on the wire.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);

    for word in &mut words {
        sum = sum.wrapping_add(u16::from_le_bytes([word[0], word[1]]) as u32);
    }

    // Odd trailing byte counts as a word of its own
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(*last as u32);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    (!(sum as u16)).swap_bytes()
}

/// True if `data` already carries a correct checksum.
pub fn verify(data: &[u8]) -> bool {
    checksum(data) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_checksum(mut data: Vec<u8>) -> Vec<u8> {
        data[2] = 0;
        data[3] = 0;
        let csum = checksum(&data);
        data[2..4].copy_from_slice(&csum.to_be_bytes());
        data
    }

    #[test]
    fn test_checksum_zeros() {
        assert_eq!(checksum(&[0u8; 20]), 0xFFFF);
    }

    #[test]
    fn test_checksum_ones() {
        assert_eq!(checksum(&[0xFFu8; 20]), 0);
    }

    #[test]
    fn test_rfc1071_example() {
        // Worked example from RFC 1071 section 3
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), 0x220d);
    }

    #[test]
    fn test_self_verifying_even_length() {
        let packet = with_checksum(vec![
            8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01, 0xde, 0xad, 0xbe, 0xef,
        ]);
        assert!(verify(&packet));
    }

    #[test]
    fn test_self_verifying_odd_lengths() {
        for payload_len in [1usize, 3, 7, 33] {
            let mut packet = vec![8, 0, 0, 0, 0xab, 0xcd, 0x00, 0x07];
            packet.extend((0..payload_len).map(|i| (i * 37 + 11) as u8));
            let packet = with_checksum(packet);
            assert!(verify(&packet), "payload of {} bytes", payload_len);
        }
    }

    #[test]
    fn test_corruption_detected() {
        let mut packet =
            with_checksum(vec![8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01, 1, 2]);
        packet[9] ^= 0x40;
        assert!(!verify(&packet));
    }
}
