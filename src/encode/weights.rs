use glam::Vec3A;

use super::EncodeOptions;

/// Perceptual base weights for the R, G, and B channels.
///
/// Green carries most of the luminance information and therefore weighs
/// heaviest.
const BASE_WEIGHTS: [f32; 3] = [0.3086, 0.6094, 0.0820];

/// Computes the per-channel error weights for one tile.
///
/// Returns `None` when channel weighting is disabled, in which case all
/// channels contribute equally. The returned weights are normalized to sum
/// to 1, so encoder behavior is invariant under uniform scaling.
///
/// With adaptive weighting, the base weights are skewed towards the tile's
/// dominant channels: a tile that is mostly red tolerates less red error
/// than the static weights would suggest.
pub(crate) fn channel_weights(block: &[[u8; 4]; 16], options: &EncodeOptions) -> Option<Vec3A> {
    if !options.channel_weighting {
        return None;
    }

    let base = Vec3A::from_array(BASE_WEIGHTS);
    if !options.adaptive_weighting {
        return Some(base);
    }

    // gravity center of the tile
    let mut average = Vec3A::ZERO;
    for &[r, g, b, _] in block {
        average += Vec3A::new(r as f32, g as f32, b as f32);
    }
    average /= 16.0;

    let largest = average.max_element();
    let average = if largest > 0.0 {
        average / largest
    } else {
        Vec3A::ONE
    };

    let mut weights = base * base / base.element_sum();
    weights = (weights * 3.0 * average + weights) * 0.25;
    weights /= weights.element_sum();

    Some(weights)
}
