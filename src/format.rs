use crate::{util::div_ceil, Size};

/// The target block compression format.
///
/// Both formats store one 4x4 pixel block per fixed-size codeword:
///
/// - [`Format::Bc1`] (`DXT1`): 8 bytes per block. 4 opaque colors, or
///   3 colors plus 1-bit punch-through transparency.
/// - [`Format::Bc3`] (`DXT5`): 16 bytes per block. An 8-byte interpolated
///   alpha block followed by an 8-byte BC1-style color block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Bc1,
    Bc3,
}

impl Format {
    /// The number of bytes of one encoded 4x4 block.
    pub const fn bytes_per_block(self) -> u8 {
        match self {
            Format::Bc1 => 8,
            Format::Bc3 => 16,
        }
    }

    /// Returns the exact number of bytes the encoded surface will occupy.
    ///
    /// This is `ceil(width / 4) * ceil(height / 4) * bytes_per_block`.
    /// Returns `None` if the byte count overflows `u64`.
    pub fn surface_bytes(self, size: Size) -> Option<u64> {
        let blocks_x = div_ceil(size.width as u64, 4);
        let blocks_y = div_ceil(size.height as u64, 4);

        blocks_x
            .checked_mul(blocks_y)?
            .checked_mul(self.bytes_per_block() as u64)
    }
}
