//! The BC3 alpha block encoder.
//!
//! An alpha block stores two 8-bit endpoints and sixteen 3-bit indices into
//! an interpolated ramp. Two ramp layouts exist, signalled by the endpoint
//! order:
//!
//! - `e0 > e1`: 8 interpolated levels.
//! - `e0 <= e1`: 6 interpolated levels plus two anchor slots fixed at
//!   0 and 255.
//!
//! The solver fits endpoints to the sorted unique alpha values with a coarse
//! interval search followed by hill climbing, then clusters the raw samples
//! against the ramp a decoder would build.

use super::Speed;

/// Upper bound used to seed best-error searches.
const MAX_ERROR: f32 = 128_000.0;

/// Values this close to 0 or 255 are handed to the anchor slots of the
/// 6-level ramp and excluded from the fitted range.
const ANCHOR_LO: f32 = 1.5 / 255.0;
const ANCHOR_HI: f32 = 253.5 / 255.0;

/// Coarse interval search and hill-climb step constants. The first set
/// favors quality, the second favors speed.
const SEARCH_QUALITY: SearchParams = SearchParams {
    grid_step: 0.0175,
    grid_extent: 0.154,
    local_step: 0.45,
};
const SEARCH_SPEED: SearchParams = SearchParams {
    grid_step: 0.018,
    grid_extent: 0.1,
    local_step: 0.6,
};

/// On the integer grid, input intervals this short cannot be improved by the
/// coarse search.
const SHORT_INTERVAL: f32 = 48.0 / 256.0;

/// Hill-climb move offsets. Mode `m` moves the bounds by
/// `(MOVES[m / 3], MOVES[m % 3])` steps.
const MOVES: [f32; 3] = [0.0, -1.0, 1.0];

#[derive(Clone, Copy)]
struct SearchParams {
    grid_step: f32,
    grid_extent: f32,
    local_step: f32,
}

/// Compresses 16 alpha samples into an 8-byte BC3 alpha block.
pub(crate) fn compress_alpha_block(alphas: &[u8; 16], speed: Speed) -> [u8; 8] {
    let mut samples = [0.0_f32; 16];
    for (dst, &a) in samples.iter_mut().zip(alphas) {
        *dst = a as f32 / 255.0;
    }

    // A tile of pure 0/255 values is represented exactly by the 6-level
    // ramp's anchors; no search needed.
    if alphas.iter().all(|&a| a == 0 || a == 255) {
        return encode_block(&solve(&samples, 6, true, speed));
    }

    let eight = solve(&samples, 8, false, speed);
    if eight.error == 0.0 {
        return encode_block(&eight);
    }

    let six = solve(&samples, 6, true, speed);
    if eight.error <= six.error {
        encode_block(&eight)
    } else {
        encode_block(&six)
    }
}

struct AlphaFit {
    endpoints: [u8; 2],
    indices: [u8; 16],
    error: f32,
}

/// Runs the endpoint solver for one ramp layout and clusters the samples
/// against the resulting ramp.
fn solve(samples: &[f32; 16], num_points: usize, anchored: bool, speed: Speed) -> AlphaFit {
    let (e0, e1) = solve_endpoints(samples, num_points, anchored, speed);
    cluster(samples, e0, e1, num_points, anchored)
}

/// Sorted unique values with repeat counts. For the anchored layout, values
/// in the anchor neighborhoods are excluded.
fn unique_values(samples: &[f32; 16], anchored: bool) -> ([f32; 16], [f32; 16], usize) {
    let mut sorted = *samples;
    sorted.sort_unstable_by(f32::total_cmp);

    let mut unique = [0.0_f32; 16];
    let mut counts = [0.0_f32; 16];
    let mut len = 0;

    for &value in &sorted {
        if anchored && (value <= ANCHOR_LO || value >= ANCHOR_HI) {
            continue;
        }
        if len > 0 && unique[len - 1] == value {
            counts[len - 1] += 1.0;
        } else {
            unique[len] = value;
            counts[len] = 1.0;
            len += 1;
        }
    }

    (unique, counts, len)
}

/// Finds the two 8-bit ramp endpoints for the given layout.
fn solve_endpoints(
    samples: &[f32; 16],
    num_points: usize,
    anchored: bool,
    speed: Speed,
) -> (f32, f32) {
    let (unique, counts, len) = unique_values(samples, anchored);

    // Degenerate fits need no search. A single value still gets two distinct
    // endpoints so the ramp is never flat; with every value in the anchor
    // neighborhoods the endpoints are invented outright.
    if len <= 2 {
        let (e0, e1) = match len {
            0 => (128.0, 129.0),
            1 => {
                let e0 = (unique[0] * 255.0 + 0.5).floor();
                (e0, e0 + 1.0)
            }
            _ => (
                (unique[0] * 255.0 + 0.5).floor(),
                (unique[1] * 255.0 + 0.5).floor(),
            ),
        };
        return fix_equal(e0.clamp(0.0, 255.0), e1.clamp(0.0, 255.0));
    }

    let unique = &unique[..len];
    let counts = &counts[..len];
    let params = match speed {
        Speed::Normal => SEARCH_QUALITY,
        Speed::Fast | Speed::SuperFast => SEARCH_SPEED,
    };

    let mut lo = unique[0];
    let mut hi = unique[len - 1];
    let center = (lo + hi) / 2.0;
    let mut best_err = MAX_ERROR;

    // The endpoints sit on the integer grid, so a short input interval is
    // already as tight as the coarse search could make it.
    if hi - lo > SHORT_INTERVAL {
        // Search the vicinities of both input bounds for the pair with the
        // lowest infinite-precision clustering error.
        let low_start = (lo - params.grid_extent).max(0.0);
        let low_end = (lo + params.grid_extent).min(center);
        let high_start = (hi + params.grid_extent).min(1.0);
        let high_end = (hi - params.grid_extent).max(center);

        let mut best_lo = 0.0;
        let mut best_hi = 0.0;
        let mut trial_lo = low_start;
        while trial_lo < low_end {
            let mut trial_hi = high_start;
            while trial_hi >= high_end {
                let err = ramp_search(unique, counts, best_err, trial_lo, trial_hi, num_points);
                if err < best_err {
                    best_err = err;
                    best_lo = trial_lo;
                    best_hi = trial_hi;
                }
                trial_hi -= params.grid_step;
            }
            trial_lo += params.grid_step;
        }

        lo = best_lo;
        hi = best_hi;
    }

    // Several small stretches and squashes to shave off quantization error.
    refine_bounds(
        unique,
        counts,
        best_err,
        &mut lo,
        &mut hi,
        params.local_step / 256.0,
        0.0,
        1.0,
        num_points,
    );

    let mut lo = lo * 255.0;
    let mut hi = hi * 255.0;

    // The fractional solve may keep the bounds apart while rounding them
    // into the same integer. Rerun the refinement on the integer grid with
    // unit step to escape the collapse.
    if hi - lo > 0.0 && (lo + 0.5).floor() == (hi + 0.5).floor() {
        let mut scaled = [0.0_f32; 16];
        for (dst, &v) in scaled.iter_mut().zip(unique) {
            *dst = v * 255.0;
        }

        lo = (lo + 0.5).floor();
        hi = lo;
        refine_bounds(
            &scaled[..len],
            counts,
            MAX_ERROR,
            &mut lo,
            &mut hi,
            1.0,
            0.0,
            255.0,
            num_points,
        );
    }

    let e0 = (lo + 0.5).floor().clamp(0.0, 255.0);
    let e1 = (hi + 0.5).floor().clamp(0.0, 255.0);
    fix_equal(e0, e1)
}

/// Equal endpoints are legal on the wire but make the ramp layout ambiguous,
/// so the pair is forced apart.
fn fix_equal(e0: f32, e1: f32) -> (f32, f32) {
    if e0 == e1 {
        if e1 < 255.0 {
            (e0, e1 + 1.0)
        } else {
            (e0, e1 - 1.0)
        }
    } else {
        (e0, e1)
    }
}

/// 1-D clustering error of the unique values against a trial ramp spanning
/// `[lo, hi]`. Bails out early once the error exceeds `max_error`.
fn ramp_search(
    unique: &[f32],
    counts: &[f32],
    max_error: f32,
    lo: f32,
    hi: f32,
    num_points: usize,
) -> f32 {
    let step = (hi - lo) / (num_points - 1) as f32;
    let half_step = step * 0.5;
    let over_step = 1.0 / step;

    let mut error = 0.0;
    for (&value, &count) in unique.iter().zip(counts) {
        let del = value - lo;
        let v = if del <= 0.0 {
            lo
        } else if value - hi >= 0.0 {
            hi
        } else {
            ((del + half_step) * over_step).floor() * step + lo
        };

        let d = value - v;
        error += d * d * count;
        if error > max_error {
            return max_error;
        }
    }
    error
}

/// Progressive local refinement: evaluates all moves in the 3x3 neighborhood
/// of the current bounds, takes the best improving one, and repeats until
/// none improves.
#[allow(clippy::too_many_arguments)]
fn refine_bounds(
    unique: &[f32],
    counts: &[f32],
    mut best_err: f32,
    lo: &mut f32,
    hi: &mut f32,
    step: f32,
    min_bound: f32,
    max_bound: f32,
    num_points: usize,
) -> f32 {
    loop {
        let mut improved = false;
        let mut next_lo = *lo;
        let mut next_hi = *hi;

        for mode in 0..MOVES.len() * MOVES.len() {
            let trial_lo = (*lo + step * MOVES[mode / 3]).max(min_bound);
            let trial_hi = (*hi + step * MOVES[mode % 3]).min(max_bound);

            let err = ramp_search(unique, counts, best_err, trial_lo, trial_hi, num_points);
            if err < best_err {
                best_err = err;
                improved = true;
                next_lo = trial_lo;
                next_hi = trial_hi;
            }
        }

        if !improved {
            return best_err;
        }
        *lo = next_lo;
        *hi = next_hi;
    }
}

/// Builds the decoder's ramp table and assigns every sample to its nearest
/// entry.
///
/// The endpoint pair is reordered here to signal the ramp layout (8-level
/// needs `e0 > e1`, anchored 6-level needs `e0 <= e1`), so the returned
/// endpoints are the ones to serialize.
fn cluster(
    samples: &[f32; 16],
    mut e0: f32,
    mut e1: f32,
    num_points: usize,
    anchored: bool,
) -> AlphaFit {
    let mut indices = [0_u8; 16];

    // both endpoints decode identically; every index works, so use 0
    if e0 == e1 {
        return AlphaFit {
            endpoints: [e0 as u8; 2],
            indices,
            error: 0.0,
        };
    }

    if (!anchored && e0 <= e1) || (anchored && e0 > e1) {
        std::mem::swap(&mut e0, &mut e1);
    }

    // ramp table in index order: the endpoints first, then the interpolated
    // levels, with the anchors in the two slots past the 6-level ramp
    let mut table = [0.0_f32; 8];
    table[0] = e0;
    table[1] = e1;
    let over = (num_points - 1) as f32;
    for e in 1..num_points - 1 {
        table[e + 1] = ((e0 * (over - e as f32) + e1 * e as f32) / over + 0.5).floor();
    }
    let table_len = if anchored {
        table[6] = 0.0;
        table[7] = 255.0;
        8
    } else {
        num_points
    };

    for value in table[..table_len].iter_mut() {
        *value /= 255.0;
    }

    let mut error = 0.0;
    for (i, &sample) in samples.iter().enumerate() {
        let mut shortest = f32::INFINITY;
        for (j, &level) in table[..table_len].iter().enumerate() {
            let d = sample - level;
            let distance = d * d;
            if distance < shortest {
                shortest = distance;
                indices[i] = j as u8;
            }
        }
        error += shortest;
    }

    AlphaFit {
        endpoints: [e0 as u8, e1 as u8],
        indices,
        error,
    }
}

/// Packs the sixteen 3-bit indices behind the two endpoint bytes. Packing is
/// LSB-first, so the indices at positions 2, 5, 10, and 13 straddle a byte
/// boundary.
fn encode_block(fit: &AlphaFit) -> [u8; 8] {
    let mut packed: u64 = 0;
    for (i, &index) in fit.indices.iter().enumerate() {
        debug_assert!(index < 8);
        packed |= (index as u64) << (i * 3);
    }

    let index_bytes = packed.to_le_bytes();
    [
        fit.endpoints[0],
        fit.endpoints[1],
        index_bytes[0],
        index_bytes[1],
        index_bytes[2],
        index_bytes[3],
        index_bytes[4],
        index_bytes[5],
    ]
}
