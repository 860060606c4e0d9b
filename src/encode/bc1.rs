//! The BC1-style color block encoder, also used for the color half of BC3.
//!
//! A color block stores two RGB565 endpoint words and sixteen 2-bit indices.
//! The numeric order of the endpoint words signals the ramp layout to the
//! decoder: `c0 > c1` selects the 4-point ramp, `c0 <= c1` the 3-point ramp
//! with a transparent fourth slot.

use glam::Vec3A;

use crate::Format;

use super::{
    block::{block_colors, ColorSet},
    cluster::{solve_endpoints, RefineSettings},
    ramp::{cluster_block, ColorRamp, Endpoints},
    EncodeOptions, Speed,
};

/// Compresses the color channels of a tile into an 8-byte block.
pub(crate) fn compress_color_block(
    block: &[[u8; 4]; 16],
    weights: Option<Vec3A>,
    format: Format,
    options: &EncodeOptions,
) -> [u8; 8] {
    let set = ColorSet::from_block(block);
    let pixels = block_colors(block);
    let weights = weights.unwrap_or(Vec3A::ONE);
    let refine = RefineSettings {
        jitter_3d: options.refine_3d,
        steps: options.refinement_steps,
    };

    // Punch-through transparency reserves the fourth index, which only the
    // 3-point ramp has.
    let transparent = (format == Format::Bc1 && options.punch_through_alpha).then(|| {
        let mut map = [false; 16];
        for (flag, pixel) in map.iter_mut().zip(block) {
            *flag = pixel[3] < options.alpha_threshold;
        }
        map
    });

    let solve = |num_points: usize| {
        let endpoints = solve_endpoints(&set, num_points, weights, refine);
        compose(&pixels, transparent.as_ref(), &endpoints, num_points, weights)
    };

    let fit = if transparent.is_some() {
        solve(3)
    } else if format == Format::Bc1 && options.speed == Speed::Normal {
        // Race the two ramp layouts and keep the better one. A 3-point fit
        // with zero error cannot be beaten.
        let three = solve(3);
        if three.error == 0.0 {
            three
        } else {
            let four = solve(4);
            if three.error <= four.error {
                three
            } else {
                four
            }
        }
    } else {
        // The fast tiers skip the race; BC3 color always uses 4 points
        // since its transparency lives in the alpha block.
        solve(4)
    };

    let c0 = fit.c0.to_le_bytes();
    let c1 = fit.c1.to_le_bytes();
    let index_bytes = fit.packed_indices().to_le_bytes();

    [
        c0[0],
        c0[1],
        c1[0],
        c1[1],
        index_bytes[0],
        index_bytes[1],
        index_bytes[2],
        index_bytes[3],
    ]
}

struct ColorFit {
    c0: u16,
    c1: u16,
    indices: [u8; 16],
    error: f32,
}

impl ColorFit {
    /// Packs the 2-bit indices in scan order, 4 per byte, low bits first.
    fn packed_indices(&self) -> u32 {
        let mut packed: u32 = 0;
        for (i, &index) in self.indices.iter().enumerate() {
            debug_assert!(index < 4);
            packed |= (index as u32) << (i * 2);
        }
        packed
    }
}

/// Orders the endpoint pair to signal the ramp layout, then clusters the
/// tile against the resulting ramp.
fn compose(
    pixels: &[Vec3A; 16],
    transparent: Option<&[bool; 16]>,
    endpoints: &Endpoints,
    num_points: usize,
    weights: Vec3A,
) -> ColorFit {
    let mut c0 = endpoints.c0;
    let mut c1 = endpoints.c1;

    let four_point = num_points % 2 == 0;
    let w0 = pack_565(c0);
    let w1 = pack_565(c1);
    if (four_point && w0 <= w1) || (!four_point && w0 > w1) {
        std::mem::swap(&mut c0, &mut c1);
    }

    let ordered = Endpoints { c0, c1 };
    let ramp = ColorRamp::new(&ordered, num_points);
    let (indices, error) = cluster_block(pixels, transparent, &ramp, weights);

    ColorFit {
        c0: pack_565(c0),
        c1: pack_565(c1),
        indices,
        error,
    }
}

/// Packs a grid-space color into an RGB565 word by dropping the replicated
/// low bits.
fn pack_565(color: Vec3A) -> u16 {
    let r = color.x as u16 >> 3;
    let g = color.y as u16 >> 2;
    let b = color.z as u16 >> 3;
    r << 11 | g << 5 | b
}
