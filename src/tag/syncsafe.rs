//! 28-bit sizes packed seven bits per byte, most significant group first.

/// Largest value a packed size field can carry.
pub const MAX_SIZE: u32 = 0x0FFF_FFFF;

pub fn encode(size: u32) -> [u8; 4] {
    let size = size & MAX_SIZE;
    [
        ((size >> 21) & 0x7F) as u8,
        ((size >> 14) & 0x7F) as u8,
        ((size >> 7) & 0x7F) as u8,
        (size & 0x7F) as u8,
    ]
}

/// High bits of each byte are ignored, as a lenient reader would.
pub fn decode(bytes: [u8; 4]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 7) | u32::from(b & 0x7F))
}
