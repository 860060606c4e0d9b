use glam::Vec3A;

/// Bits per channel of the RGB565 endpoint encoding.
pub(crate) const CHANNEL_BITS: [u32; 3] = [5, 6, 5];

/// Rounding bias applied to interpolated ramp entries, indexed by the number
/// of ramp points. The values reproduce the reference decoder's rounding.
const ROUND_BIAS: [f32; 9] = [0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0];

/// Ramp entries past the point count are poisoned with this value, so a scan
/// over the full backing array can never select an unused slot.
pub(crate) const RAMP_SENTINEL: f32 = 1_000_000.0;

/// A pair of RGB endpoints in `0..=255` space.
///
/// During solving these hold values on the quantization grid (multiples of
/// `1 << (8 - bits)` per channel); [`expand_endpoints`] turns them into the
/// 8-bit values a decoder reconstructs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Endpoints {
    pub c0: Vec3A,
    pub c1: Vec3A,
}

/// Replicates the top bits of a grid-aligned channel value into its low bits,
/// like hardware expanding a 5/6-bit channel to 8 bits.
pub(crate) fn expand_channel(value: f32, bits: u32) -> f32 {
    let factor = (1_u32 << bits) as f32;
    (value + (value / factor).floor()).clamp(0.0, 255.0)
}

/// Expands both endpoints to the values the decoder will reconstruct.
///
/// Also reports whether the input ramp is flat (both endpoints identical),
/// in which case only ramp entry 0 is meaningful.
pub(crate) fn expand_endpoints(endpoints: &Endpoints) -> (Endpoints, bool) {
    let flat = endpoints.c0 == endpoints.c1;

    let expand = |c: Vec3A| {
        Vec3A::new(
            expand_channel(c.x, CHANNEL_BITS[0]),
            expand_channel(c.y, CHANNEL_BITS[1]),
            expand_channel(c.z, CHANNEL_BITS[2]),
        )
    };

    (
        Endpoints {
            c0: expand(endpoints.c0),
            c1: expand(endpoints.c1),
        },
        flat,
    )
}

/// Interpolates one channel of a ramp from its (expanded) endpoint values.
///
/// Entry 0 and entry `num_points - 1` are the endpoints themselves; the
/// entries in between are linear mixes with the decoder's rounding bias.
/// Unused entries are set to [`RAMP_SENTINEL`].
pub(crate) fn channel_ramp(c0: f32, c1: f32, num_points: usize) -> [f32; 4] {
    debug_assert!(num_points == 3 || num_points == 4);

    let mut ramp = [RAMP_SENTINEL; 4];
    ramp[0] = c0;
    ramp[num_points - 1] = c1;

    let over = (num_points - 1) as f32;
    for e in 1..num_points - 1 {
        ramp[e] = ((c0 * (over - e as f32) + c1 * e as f32 + ROUND_BIAS[num_points]) / over).floor();
    }
    ramp
}

/// The reconstruction palette of one color block, in solver order:
/// entry 0 and entry `len - 1` are the endpoints.
pub(crate) struct ColorRamp {
    points: [Vec3A; 4],
    len: usize,
    flat: bool,
}

impl ColorRamp {
    /// Builds the ramp exactly as the decoder would, from unexpanded
    /// grid-space endpoints.
    pub fn new(endpoints: &Endpoints, num_points: usize) -> Self {
        let (expanded, flat) = expand_endpoints(endpoints);

        let r = channel_ramp(expanded.c0.x, expanded.c1.x, num_points);
        let g = channel_ramp(expanded.c0.y, expanded.c1.y, num_points);
        let b = channel_ramp(expanded.c0.z, expanded.c1.z, num_points);

        let mut points = [Vec3A::splat(RAMP_SENTINEL); 4];
        for e in 0..num_points {
            points[e] = Vec3A::new(r[e], g[e], b[e]);
        }

        Self {
            points,
            len: num_points,
            flat,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// The number of entries worth scanning: a flat ramp repeats the same
    /// color, so only entry 0 is considered.
    fn scan_len(&self) -> usize {
        if self.flat {
            1
        } else {
            self.len
        }
    }

    /// Returns the index of the nearest ramp entry and its weighted squared
    /// distance.
    pub fn nearest(&self, color: Vec3A, weights: Vec3A) -> (usize, f32) {
        let mut best = 0;
        let mut shortest = f32::INFINITY;
        for (r, &point) in self.points[..self.scan_len()].iter().enumerate() {
            let diff = color - point;
            let distance = (diff * diff * weights).element_sum();
            if distance < shortest {
                shortest = distance;
                best = r;
            }
        }
        (best, shortest)
    }
}

/// Relabels a solver-order ramp index to the packed hardware convention:
/// the last ramp entry becomes index 1, and everything from old index 1
/// upward shifts by one.
fn relabel(index: usize, num_points: usize) -> u8 {
    if index == num_points - 1 {
        1
    } else if index > 0 {
        (index + 1) as u8
    } else {
        0
    }
}

/// Assigns every pixel of a tile to its nearest ramp entry.
///
/// Returns the 16 hardware-order indices and the cumulative weighted error.
/// Pixels flagged in `transparent` are force-assigned the reserved index
/// `num_points` (the decoder's transparent slot) and excluded from the error.
pub(crate) fn cluster_block(
    pixels: &[Vec3A; 16],
    transparent: Option<&[bool; 16]>,
    ramp: &ColorRamp,
    weights: Vec3A,
) -> ([u8; 16], f32) {
    let mut indices = [0_u8; 16];
    let mut error = 0.0;

    for (i, &pixel) in pixels.iter().enumerate() {
        if transparent.is_some_and(|t| t[i]) {
            indices[i] = ramp.len() as u8;
            continue;
        }

        let (nearest, shortest) = ramp.nearest(pixel, weights);
        error += shortest;
        indices[i] = relabel(nearest, ramp.len());
    }

    (indices, error)
}
