/// Low byte of the sum over every byte but the first, as two uppercase hex digits.
pub fn checksum(header_and_payload: &[u8]) -> [u8; 2] {
    let sum = header_and_payload
        .iter()
        .skip(1)
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    [hex_digit(sum >> 4), hex_digit(sum & 0x0F)]
}

fn hex_digit(nibble: u8) -> u8 {
    match nibble {
        0..=9 => b'0' + nibble,
        _ => b'A' + nibble - 10,
    }
}
