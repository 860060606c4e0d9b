//! A reference decoder for checking encoder output.
#![allow(unused)]

use dxtc::{Format, Size};

/// Expands a 5- or 6-bit channel value to 8 bits by bit replication.
fn expand(value: u16, bits: u32) -> u8 {
    debug_assert!(value < (1_u16 << bits));
    ((value << (8 - bits)) | (value >> (2 * bits - 8))) as u8
}

fn unpack_565(word: u16) -> [u8; 3] {
    [
        expand((word >> 11) & 0b11111, 5),
        expand((word >> 5) & 0b111111, 6),
        expand(word & 0b11111, 5),
    ]
}

/// Interpolated palette entry with the reference rounding bias.
fn mix(a: [u8; 3], b: [u8; 3], num_points: usize, e: usize) -> [u8; 3] {
    let bias: [u32; 9] = [0, 0, 0, 0, 1, 1, 2, 2, 3];
    let over = (num_points - 1) as u32;
    let mut out = [0_u8; 3];
    for j in 0..3 {
        let v = (a[j] as u32 * (over - e as u32) + b[j] as u32 * e as u32 + bias[num_points]) / over;
        out[j] = v as u8;
    }
    out
}

/// Decodes an 8-byte BC1 color block, including the 3-color + transparent
/// mode.
pub fn decode_bc1_block(block: &[u8; 8]) -> [[u8; 4]; 16] {
    let c0_word = u16::from_le_bytes([block[0], block[1]]);
    let c1_word = u16::from_le_bytes([block[2], block[3]]);
    let c0 = unpack_565(c0_word);
    let c1 = unpack_565(c1_word);

    let mut palette = [[0_u8; 4]; 4];
    if c0_word > c1_word {
        // 4-color mode
        let m1 = mix(c0, c1, 4, 1);
        let m2 = mix(c0, c1, 4, 2);
        palette[0] = [c0[0], c0[1], c0[2], 255];
        palette[1] = [c1[0], c1[1], c1[2], 255];
        palette[2] = [m1[0], m1[1], m1[2], 255];
        palette[3] = [m2[0], m2[1], m2[2], 255];
    } else {
        // 3-color + transparent mode
        let m = mix(c0, c1, 3, 1);
        palette[0] = [c0[0], c0[1], c0[2], 255];
        palette[1] = [c1[0], c1[1], c1[2], 255];
        palette[2] = [m[0], m[1], m[2], 255];
        palette[3] = [0, 0, 0, 0];
    }

    let indices = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let mut out = [[0_u8; 4]; 16];
    for (i, pixel) in out.iter_mut().enumerate() {
        *pixel = palette[((indices >> (i * 2)) & 0b11) as usize];
    }
    out
}

/// Decodes the 16 alpha values of an 8-byte BC3 alpha block.
pub fn decode_alpha_block(block: &[u8; 8]) -> [u8; 16] {
    let e0 = block[0] as u32;
    let e1 = block[1] as u32;

    let mut table = [0_u32; 8];
    table[0] = e0;
    table[1] = e1;
    if block[0] > block[1] {
        // 8-level mode
        for e in 1..7 {
            table[e + 1] = (e0 * (7 - e as u32) * 2 + e1 * e as u32 * 2 + 7) / 14;
        }
    } else {
        // 6-level mode with anchors
        for e in 1..5 {
            table[e + 1] = (e0 * (5 - e as u32) * 2 + e1 * e as u32 * 2 + 5) / 10;
        }
        table[6] = 0;
        table[7] = 255;
    }

    let mut packed: u64 = 0;
    for (i, &b) in block[2..8].iter().enumerate() {
        packed |= (b as u64) << (i * 8);
    }

    let mut out = [0_u8; 16];
    for (i, v) in out.iter_mut().enumerate() {
        *v = table[((packed >> (i * 3)) & 0b111) as usize] as u8;
    }
    out
}

/// Decodes an encoded surface back into RGBA pixels, including the
/// replicated pixels of partial edge blocks.
pub fn decode_surface(data: &[u8], size: Size, format: Format) -> Vec<[u8; 4]> {
    let blocks_x = (size.width as usize + 3) / 4;
    let blocks_y = (size.height as usize + 3) / 4;
    let bytes_per_block = format.bytes_per_block() as usize;
    assert_eq!(data.len(), blocks_x * blocks_y * bytes_per_block);

    let mut out = vec![[0_u8; 4]; size.width as usize * size.height as usize];
    for block_y in 0..blocks_y {
        for block_x in 0..blocks_x {
            let offset = (block_y * blocks_x + block_x) * bytes_per_block;
            let block = &data[offset..offset + bytes_per_block];

            let (alphas, colors) = match format {
                Format::Bc1 => (None, decode_bc1_block(block.try_into().unwrap())),
                Format::Bc3 => (
                    Some(decode_alpha_block(block[..8].try_into().unwrap())),
                    decode_bc1_block(block[8..].try_into().unwrap()),
                ),
            };

            for py in 0..4 {
                for px in 0..4 {
                    let x = block_x * 4 + px;
                    let y = block_y * 4 + py;
                    if x >= size.width as usize || y >= size.height as usize {
                        continue;
                    }
                    let mut pixel = colors[py * 4 + px];
                    if let Some(alphas) = &alphas {
                        pixel[3] = alphas[py * 4 + px];
                    }
                    out[y * size.width as usize + x] = pixel;
                }
            }
        }
    }
    out
}

/// Mean squared RGB error between an image and its decoded version.
pub fn rgb_mse(original: &[u8], decoded: &[[u8; 4]]) -> f64 {
    assert_eq!(original.len(), decoded.len() * 4);

    let mut sum = 0.0;
    for (orig, dec) in original.chunks_exact(4).zip(decoded) {
        for j in 0..3 {
            let d = orig[j] as f64 - dec[j] as f64;
            sum += d * d;
        }
    }
    sum / decoded.len() as f64
}
