//! The color endpoint solver.
//!
//! Given the unique colors of one tile, this finds the two RGB565 endpoints
//! whose interpolated ramp minimizes the weighted squared error:
//!
//! 1. Fit a line through color space: start from the principal axis of the
//!    repeat-weighted covariance, then alternate between quantizing along
//!    the axis and re-deriving the axis from the quantization (a cluster
//!    fit). This all happens in normalized, centered color space.
//! 2. Snap the continuous endpoints onto the 5/6/5 grid, biased so the
//!    bit-replicated values a decoder reconstructs land near the intent.
//! 3. Jitter the endpoints on the grid, per channel or jointly, and keep
//!    the best result. This step never worsens the pre-refinement error.

use glam::{Vec3A, Vec3Swizzles};

use super::{
    block::ColorSet,
    ramp::{channel_ramp, expand_channel, Endpoints, CHANNEL_BITS},
};

/// Squared-distance epsilon under which a single channel is considered to
/// have no variance (2 of 255 quantization levels).
const FLAT_EPS: f32 = (2.0 / 255.0) * (2.0 / 255.0);
/// Epsilon under which the whole color set is considered a single point.
const DEGENERATE_EPS: f32 = 3.0 * FLAT_EPS;

/// Upper bound used to seed best-error searches.
const MAX_ERROR: f32 = 128_000.0;

/// Step count and size of the two-sided projection-bound search. The search
/// interval is rescaled to `[0, 1]` first, so the step is absolute.
const BOUND_SEARCH_STEPS: usize = 8;
const BOUND_SEARCH_STEP: f32 = 0.025;

#[derive(Debug, Clone, Copy)]
pub(crate) struct RefineSettings {
    pub jitter_3d: bool,
    pub steps: u8,
}

/// Finds two endpoint colors (in `0..=255` grid space) for the given color
/// set and ramp point count.
pub(crate) fn solve_endpoints(
    set: &ColorSet,
    num_points: usize,
    weights: Vec3A,
    refine: RefineSettings,
) -> Endpoints {
    debug_assert!(num_points == 3 || num_points == 4);

    let continuous = solve_continuous(set, num_points);
    let on_grid = snap_to_grid(&continuous);

    if refine.jitter_3d {
        refine_joint(&on_grid, set, num_points, weights, refine.steps)
    } else {
        refine_channels(&on_grid, set, num_points, weights, refine.steps)
    }
}

/// The unrestricted full-precision part of the solve. Returns endpoints in
/// `0..=255` space, off-grid.
fn solve_continuous(set: &ColorSet, num_points: usize) -> Endpoints {
    // Tiny sets need no search: the extremes are the first and last color.
    if set.len() <= 2 {
        return Endpoints {
            c0: set.first(),
            c1: set.last(),
        };
    }

    // The search runs on normalized colors so the epsilons below are
    // independent of the value range.
    let mut colors = [Vec3A::ZERO; 16];
    for (dst, &src) in colors.iter_mut().zip(set.colors()) {
        *dst = src / 255.0;
    }
    let counts = set.counts();

    let (center, offsets) = centered_offsets(&colors[..set.len()], counts);
    let offsets = &offsets[..set.len()];

    let Some(axis) = find_axis(offsets, counts) else {
        // The set's diameter is too small to fit a line through. Do not
        // bother.
        return Endpoints {
            c0: set.first(),
            c1: set.last(),
        };
    };

    let (dir, bounds) = cluster_fit(offsets, counts, axis, num_points);

    Endpoints {
        c0: (bounds[0] * dir + center) * 255.0,
        c1: (bounds[1] * dir + center) * 255.0,
    }
}

/// Repeat-weighted centroid and the colors as offsets around it.
fn centered_offsets(colors: &[Vec3A], counts: &[f32]) -> (Vec3A, [Vec3A; 16]) {
    let mut center = Vec3A::ZERO;
    let mut total = 0.0;
    for (&color, &count) in colors.iter().zip(counts) {
        center += color * count;
        total += count;
    }
    center /= total;

    let mut offsets = [Vec3A::ZERO; 16];
    for (dst, &color) in offsets.iter_mut().zip(colors) {
        *dst = color - center;
    }
    (center, offsets)
}

/// First approximation of the line through the color set: the principal
/// direction of the repeat-weighted covariance of the centered colors,
/// determined analytically.
///
/// Returns `None` when every channel's variance falls below the degenerate
/// epsilon.
fn find_axis(offsets: &[Vec3A], counts: &[f32]) -> Option<Vec3A> {
    // variance per channel, and correlation with the next channel
    let mut variance = Vec3A::ZERO;
    let mut correlation = Vec3A::ZERO;
    let mut total = 0.0;
    for (&offset, &count) in offsets.iter().zip(counts) {
        variance += offset * offset * count;
        correlation += offset * offset.yzx() * count;
        total += count;
    }

    let mut variance = variance.to_array();
    let correlation = correlation.to_array();

    // count the channels that actually vary, and find the strongest
    let flat_eps = total * FLAT_EPS;
    let mut rank = 0;
    let mut strongest = 0;
    let mut max_variance = 0.0;
    for (j, v) in variance.iter_mut().enumerate() {
        if *v >= flat_eps {
            rank += 1;
        } else {
            *v = 0.0;
        }
        if *v > max_variance {
            max_variance = *v;
            strongest = j;
        }
    }

    if variance.iter().all(|&v| v < total * DEGENERATE_EPS) {
        return None;
    }

    let mut dir = [0.0_f32; 3];
    match rank {
        // only one channel varies
        1 => dir[strongest] = 1.0,
        // two channels vary; solve the reduced 2-variable system
        2 => {
            let i0 = strongest;
            let i1 = if variance[(i0 + 1) % 3] > 0.0 {
                (i0 + 1) % 3
            } else {
                (i0 + 2) % 3
            };
            let crl = if i1 == (i0 + 1) % 3 {
                correlation[i0]
            } else {
                correlation[(i0 + 2) % 3]
            };
            dir[i1] = crl / variance[i0];
            dir[i0] = 1.0;
        }
        // full rank; invert the best-conditioned 2x2 sub-system via its
        // cofactors
        _ => {
            let mut i0 = strongest;
            let mut max_det = 100_000.0;
            for j in 0..3 {
                let det =
                    variance[j] * variance[(j + 1) % 3] - correlation[j] * correlation[j];
                if det > max_det {
                    max_det = det;
                    i0 = j;
                }
            }

            let rhs = [correlation[(i0 + 2) % 3], correlation[(i0 + 1) % 3]];
            //  --     --       --      --
            //  |  a  b |       |  c  -b |
            //  |  b  c |   =>  | -b   a |
            //  --     --       --      --
            let inv = [
                [variance[(i0 + 1) % 3], -correlation[i0]],
                [-correlation[i0], variance[i0]],
            ];
            let x0 = (inv[0][0] * rhs[0] + inv[0][1] * rhs[1]) / max_det;
            let x1 = (inv[1][0] * rhs[0] + inv[1][1] * rhs[1]) / max_det;

            dir[i0] = 1.0;
            dir[(i0 + 1) % 3] = 1.0;
            dir[(i0 + 2) % 3] = x0 + x1;
        }
    }

    let dir = Vec3A::from_array(dir).normalize_or_zero();
    if dir == Vec3A::ZERO {
        return None;
    }
    Some(dir)
}

/// The alternating-projection loop.
///
/// 1. Project the color set on the current axis.
/// 2. Run a bounded 1-D search for a (sub)optimal pair of projection bounds.
/// 3. Compute the index vector for the resulting ramp.
/// 4. Re-derive the axis as the repeat-weighted regression of the colors
///    against the centered index positions.
/// 5. Repeat until no candidate improves the error.
///
/// Returns the final axis and its `[low, high]` projection bounds.
fn cluster_fit(
    offsets: &[Vec3A],
    counts: &[f32],
    mut dir: Vec3A,
    num_points: usize,
) -> (Vec3A, [f32; 2]) {
    let count = offsets.len();
    let over_top = 1.0 / (num_points - 1) as f32;
    let index_center = (num_points - 1) as f32 / 2.0;

    let mut best_err = f32::INFINITY;
    let mut best_dir = dir;
    let mut best_bounds = [0.0_f32; 2];

    let mut projected = [0.0_f32; 16];
    let mut residual = [0.0_f32; 16];
    let mut scaled = [0.0_f32; 16];
    let mut scaled_counts = [0.0_f32; 16];

    loop {
        // 1. project on the axis; the perpendicular residual is a fixed cost
        // of every candidate bound pair
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for i in 0..count {
            projected[i] = offsets[i].dot(dir);
            let perp = offsets[i] - dir * projected[i];
            residual[i] = perp.dot(perp);
            lo = lo.min(projected[i]);
            hi = hi.max(projected[i]);
        }

        // 2. rescale the search interval (extended by an eighth on both
        // sides) to [0, 1] and search bound pairs on a fixed grid
        let scale_lo = lo - (hi - lo) * 0.125;
        let scale_hi = hi + (hi - lo) * 0.125;
        let extent = scale_hi - scale_lo;
        if extent <= f32::EPSILON {
            // every color projects to the same point; nothing to search
            break;
        }
        let extent_sq = extent * extent;
        let over_extent = 1.0 / extent;

        for i in 0..count {
            scaled[i] = (projected[i] - scale_lo) * over_extent;
            // pre-multiply the scale back into the repeat counts so errors
            // compare in unscaled space
            scaled_counts[i] = counts[i] * extent_sq;
        }
        let bnd_lo = (lo - scale_lo) * over_extent;
        let bnd_hi = (hi - scale_lo) * over_extent;

        let mut err = MAX_ERROR;
        let mut pos = [0.0_f32; 2];
        let start_lo = (bnd_lo - 2.0 * BOUND_SEARCH_STEP).max(0.0);
        let start_hi = (bnd_hi + 2.0 * BOUND_SEARCH_STEP).min(1.0);
        for l in 0..BOUND_SEARCH_STEPS {
            let trial_lo = start_lo + l as f32 * BOUND_SEARCH_STEP;
            for h in 0..BOUND_SEARCH_STEPS {
                let trial_hi = start_hi - h as f32 * BOUND_SEARCH_STEP;
                let trial = ramp_search(
                    &scaled[..count],
                    &residual[..count],
                    &scaled_counts[..count],
                    err,
                    trial_lo,
                    trial_hi,
                    num_points,
                );
                if trial < err {
                    err = trial;
                    pos = [trial_lo, trial_hi];
                }
            }
        }

        // undo the interval rescale
        let pos = [pos[0] * extent + scale_lo, pos[1] * extent + scale_lo];

        // anything better than the previous iteration?
        if err + 0.001 >= best_err {
            break;
        }
        best_err = err;
        best_dir = dir;
        best_bounds = pos;

        // 3. the index vector of the current ramp, shifted and normalized
        let step = (pos[1] - pos[0]) * over_top;
        let half_step = step * 0.5;
        let over_step = 1.0 / step;
        let mut indexes = [0.0_f32; 16];
        for i in 0..count {
            let del = projected[i] - pos[0];
            let index = if del <= 0.0 {
                0.0
            } else if projected[i] - pos[1] >= 0.0 {
                (num_points - 1) as f32
            } else {
                ((del + half_step) * over_step).floor()
            };
            indexes[i] = (index - index_center) * over_top;
        }

        // 4. closest approximation of each color dimension by the index
        // vector: the per-channel scales form the next axis
        let mut cross = Vec3A::ZERO;
        let mut len = 0.0;
        for i in 0..count {
            let pre = indexes[i] * counts[i];
            len += indexes[i] * pre;
            cross += offsets[i] * pre;
        }
        dir = if len > 0.0 {
            (cross / len).normalize_or_zero()
        } else {
            Vec3A::ZERO
        };
    }

    (best_dir, best_bounds)
}

/// 1-D clustering error of the projected colors against a trial ramp
/// spanning `[lo, hi]`.
///
/// `residual` carries each color's fixed perpendicular distance to the axis.
/// Bails out early once the accumulated error exceeds `max_error`.
fn ramp_search(
    projected: &[f32],
    residual: &[f32],
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
    for ((&p, &r), &count) in projected.iter().zip(residual).zip(counts) {
        let del = p - lo;
        let v = if del <= 0.0 {
            lo
        } else if p - hi >= 0.0 {
            hi
        } else {
            ((del + half_step) * over_step).floor() * step + lo
        };

        let d = p - v;
        error += count * d * d + r;
        if error > max_error {
            return max_error;
        }
    }
    error
}

/// Rounds continuous endpoints onto the 5/6/5 grid.
///
/// The offset `128 >> bits` compensates for the decoder's bit replication:
/// the replicated value of the chosen grid point lands as close as possible
/// to the continuous value.
fn snap_to_grid(endpoints: &Endpoints) -> Endpoints {
    let snap = |c: Vec3A| {
        let c = c.to_array();
        let mut out = [0.0_f32; 3];
        for (j, v) in out.iter_mut().enumerate() {
            let hi_factor = (1_u32 << CHANNEL_BITS[j]) as f32;
            let lo_factor = (1_u32 << (8 - CHANNEL_BITS[j])) as f32;

            *v = c[j].floor();
            if *v <= 0.0 {
                *v = 0.0;
            } else {
                *v += (128.0 / hi_factor).floor() - (*v / hi_factor).floor();
                *v = v.min(255.0);
            }
            *v = (*v / lo_factor).floor() * lo_factor;
        }
        Vec3A::from_array(out)
    };

    Endpoints {
        c0: snap(endpoints.c0),
        c1: snap(endpoints.c1),
    }
}

/// Per-channel endpoint values, `[channel][endpoint]`, as used by the
/// refinement passes which move one channel at a time.
type ChannelPairs = [[f32; 2]; 3];

fn to_channel_pairs(endpoints: &Endpoints) -> ChannelPairs {
    let c0 = endpoints.c0.to_array();
    let c1 = endpoints.c1.to_array();
    [[c0[0], c1[0]], [c0[1], c1[1]], [c0[2], c1[2]]]
}

fn from_channel_pairs(pairs: &ChannelPairs) -> Endpoints {
    Endpoints {
        c0: Vec3A::new(pairs[0][0], pairs[1][0], pairs[2][0]),
        c1: Vec3A::new(pairs[0][1], pairs[1][1], pairs[2][1]),
    }
}

/// Expands all channel pairs to decoded values; returns whether the ramp is
/// flat (both endpoints identical before expansion).
fn expand_pairs(pairs: &ChannelPairs) -> (ChannelPairs, bool) {
    let mut expanded = [[0.0_f32; 2]; 3];
    let mut flat = true;
    for j in 0..3 {
        expanded[j][0] = expand_channel(pairs[j][0], CHANNEL_BITS[j]);
        expanded[j][1] = expand_channel(pairs[j][1], CHANNEL_BITS[j]);
        flat &= pairs[j][0] == pairs[j][1];
    }
    (expanded, flat)
}

/// Ramps for all three channels, `[channel][ramp entry]`.
fn build_ramps(expanded: &ChannelPairs, num_points: usize) -> [[f32; 4]; 3] {
    [
        channel_ramp(expanded[0][0], expanded[0][1], num_points),
        channel_ramp(expanded[1][0], expanded[1][1], num_points),
        channel_ramp(expanded[2][0], expanded[2][1], num_points),
    ]
}

/// Weighted clustering error of the unique colors against per-channel ramps.
fn ramps_error(
    set: &ColorSet,
    ramps: &[[f32; 4]; 3],
    num_points: usize,
    flat: bool,
    weights: Vec3A,
) -> f32 {
    let scan = if flat { 1 } else { num_points };
    let w = weights.to_array();

    let mut error = 0.0;
    for (&color, &count) in set.colors().iter().zip(set.counts()) {
        let c = color.to_array();
        let mut shortest = f32::INFINITY;
        for r in 0..scan {
            let mut distance = 0.0;
            for j in 0..3 {
                let d = ramps[j][r] - c[j];
                distance += d * d * w[j];
            }
            shortest = shortest.min(distance);
        }
        error += shortest * count;
    }
    error
}

/// Squeezes and stretches the ramp along each axis separately while the
/// other two are fixed, on the coarse 5/6/5 grid, trying to squeeze out more
/// precision for the real-world ramp. Channels are fixed in R, G, B order;
/// a move is only accepted when it improves the total weighted error.
fn refine_channels(
    endpoints: &Endpoints,
    set: &ColorSet,
    num_points: usize,
    weights: Vec3A,
    steps: u8,
) -> Endpoints {
    let start = to_channel_pairs(endpoints);
    let mut current = start;

    let (expanded, flat) = expand_pairs(&current);
    let mut ramps = build_ramps(&expanded, num_points);
    let mut best_err = ramps_error(set, &ramps, num_points, flat, weights);
    if best_err == 0.0 || steps == 0 {
        return *endpoints;
    }

    let w = weights.to_array();
    let range = steps.min(8) as i32;

    for ch in 0..3 {
        let grid_step = (1_u32 << (8 - CHANNEL_BITS[ch])) as f32;
        let (o1, o2) = ((ch + 1) % 3, (ch + 2) % 3);

        // the error contribution of the two fixed channels is constant per
        // (color, ramp entry) pair
        let mut fixed_err = [[0.0_f32; 16]; 4];
        for (i, &color) in set.colors().iter().enumerate() {
            let c = color.to_array();
            for r in 0..num_points {
                let d1 = ramps[o1][r] - c[o1];
                let d2 = ramps[o2][r] - c[o2];
                fixed_err[r][i] = d1 * d1 * w[o1] + d2 * d2 * w[o2];
            }
        }

        let mut best_pair = start[ch];
        for i in -range..=range {
            for j in -range..=range {
                current[ch][0] = (start[ch][0] + i as f32 * grid_step).clamp(0.0, 255.0);
                current[ch][1] = (start[ch][1] + j as f32 * grid_step).clamp(0.0, 255.0);

                let (expanded, flat) = expand_pairs(&current);
                let trial_ramp = channel_ramp(expanded[ch][0], expanded[ch][1], num_points);
                let scan = if flat { 1 } else { num_points };

                let mut err = 0.0;
                for (k, &color) in set.colors().iter().enumerate() {
                    let c = color.to_array();
                    let mut shortest = f32::INFINITY;
                    for r in 0..scan {
                        let d = trial_ramp[r] - c[ch];
                        shortest = shortest.min(fixed_err[r][k] + d * d * w[ch]);
                    }
                    err += shortest * set.counts()[k];
                }

                if err < best_err {
                    best_pair = current[ch];
                    best_err = err;
                }
            }
        }

        // fix this channel at its best and rebuild the ramps for the next one
        current[ch] = best_pair;
        let (expanded, _) = expand_pairs(&current);
        ramps = build_ramps(&expanded, num_points);
    }

    from_channel_pairs(&current)
}

/// Like [`refine_channels`], but jitters all three channels jointly. The
/// exhaustive `(2 * steps + 1)^6` sweep finds combinations the greedy
/// per-channel pass cannot, at a much higher cost.
fn refine_joint(
    endpoints: &Endpoints,
    set: &ColorSet,
    num_points: usize,
    weights: Vec3A,
    steps: u8,
) -> Endpoints {
    const R: usize = 0;
    const G: usize = 1;
    const B: usize = 2;

    let start = to_channel_pairs(endpoints);
    let mut current = start;
    let mut best = start;

    let (expanded, flat) = expand_pairs(&current);
    let ramps = build_ramps(&expanded, num_points);
    let mut best_err = ramps_error(set, &ramps, num_points, flat, weights);
    if best_err == 0.0 || steps == 0 {
        return *endpoints;
    }

    let w = weights.to_array();
    let range = steps.min(8) as i32;
    let unique = set.len();
    let grid_step = |ch: usize| (1_u32 << (8 - CHANNEL_BITS[ch])) as f32;

    for jg0 in -range..=range {
        current[G][0] = (start[G][0] + jg0 as f32 * grid_step(G)).clamp(0.0, 255.0);
        for jg1 in -range..=range {
            current[G][1] = (start[G][1] + jg1 as f32 * grid_step(G)).clamp(0.0, 255.0);
            let (expanded, _) = expand_pairs(&current);
            let ramp_g = channel_ramp(expanded[G][0], expanded[G][1], num_points);

            let mut err_g = [[0.0_f32; 16]; 4];
            for (i, &color) in set.colors().iter().enumerate() {
                let c = color.to_array();
                for r in 0..num_points {
                    let d = ramp_g[r] - c[G];
                    err_g[r][i] = d * d * w[G];
                }
            }

            for jb0 in -range..=range {
                current[B][0] = (start[B][0] + jb0 as f32 * grid_step(B)).clamp(0.0, 255.0);
                for jb1 in -range..=range {
                    current[B][1] = (start[B][1] + jb1 as f32 * grid_step(B)).clamp(0.0, 255.0);
                    let (expanded, _) = expand_pairs(&current);
                    let ramp_b = channel_ramp(expanded[B][0], expanded[B][1], num_points);

                    let mut err_gb = [[0.0_f32; 16]; 4];
                    for (i, &color) in set.colors().iter().enumerate() {
                        let c = color.to_array();
                        for r in 0..num_points {
                            let d = ramp_b[r] - c[B];
                            err_gb[r][i] = err_g[r][i] + d * d * w[B];
                        }
                    }

                    for jr0 in -range..=range {
                        current[R][0] =
                            (start[R][0] + jr0 as f32 * grid_step(R)).clamp(0.0, 255.0);
                        for jr1 in -range..=range {
                            current[R][1] =
                                (start[R][1] + jr1 as f32 * grid_step(R)).clamp(0.0, 255.0);
                            let (expanded, flat) = expand_pairs(&current);
                            let ramp_r =
                                channel_ramp(expanded[R][0], expanded[R][1], num_points);
                            let scan = if flat { 1 } else { num_points };

                            let mut err = 0.0;
                            for k in 0..unique {
                                let c = set.colors()[k].to_array();
                                let mut shortest = f32::INFINITY;
                                for r in 0..scan {
                                    let d = ramp_r[r] - c[R];
                                    shortest = shortest.min(err_gb[r][k] + d * d * w[R]);
                                }
                                err += shortest * set.counts()[k];
                            }

                            if err < best_err {
                                best_err = err;
                                best = current;
                            }
                        }
                    }
                }
            }
        }
    }

    from_channel_pairs(&best)
}
