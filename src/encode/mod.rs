use std::io::Write;

use crate::{util::div_ceil, EncodingError, Format, ImageView, Progress};

mod alpha;
mod bc1;
mod block;
mod cluster;
mod ramp;
mod weights;

use alpha::compress_alpha_block;
use bc1::compress_color_block;
use block::{block_alphas, read_block};
use weights::channel_weights;

/// Encodes an RGBA 8-bit image in the given format and writes the encoded
/// blocks to the given writer.
///
/// Blocks are written in row-major block order. The output is exactly
/// [`Format::surface_bytes`] bytes long.
///
/// If an error is returned (or the operation is cancelled), the writer may
/// be in an inconsistent state. Some, all, or none of the blocks may have
/// been written.
///
/// Passing `None` as `progress` is equivalent to [`Progress::none()`].
pub fn encode(
    writer: &mut dyn Write,
    image: ImageView,
    format: Format,
    progress: Option<&mut Progress>,
    options: &EncodeOptions,
) -> Result<(), EncodingError> {
    let mut no_reporting = Progress::none();
    let progress = progress.unwrap_or(&mut no_reporting);

    // ending quickly if cancelled is a good property to have
    progress.check_cancelled()?;

    #[cfg(feature = "rayon")]
    if options.parallel {
        return encode_parallel(writer, image, format, progress, options);
    }

    let blocks_x = div_ceil(image.width(), 4);
    let blocks_y = div_ceil(image.height(), 4);
    let row_bytes = blocks_x as usize * format.bytes_per_block() as usize;

    let mut row = vec![0_u8; row_bytes];
    for block_y in 0..blocks_y {
        progress.checked_report(block_y as f32 / blocks_y as f32)?;

        encode_block_row(image, block_y, format, options, &mut row);
        writer.write_all(&row)?;
    }

    progress.checked_report(1.0)
}

#[cfg(feature = "rayon")]
fn encode_parallel(
    writer: &mut dyn Write,
    image: ImageView,
    format: Format,
    progress: &mut Progress,
    options: &EncodeOptions,
) -> Result<(), EncodingError> {
    use rayon::iter::{IndexedParallelIterator, ParallelIterator};
    use rayon::slice::ParallelSliceMut;

    use crate::progress::ParallelProgress;

    let blocks_x = div_ceil(image.width(), 4);
    let blocks_y = div_ceil(image.height(), 4);
    let row_bytes = blocks_x as usize * format.bytes_per_block() as usize;

    // The +1 ensures that 100% is only reported after everything has been
    // handed to the writer.
    let parallel_progress = ParallelProgress::new(progress, blocks_y as u64 + 1);

    // Every block row owns a disjoint slice of the output buffer, so the
    // workers never need to synchronize on anything but the progress
    // reporter.
    let mut buffer = vec![0_u8; row_bytes * blocks_y as usize];
    buffer
        .par_chunks_exact_mut(row_bytes)
        .enumerate()
        .try_for_each(|(block_y, row)| -> Result<(), EncodingError> {
            parallel_progress.check_cancelled()?;
            encode_block_row(image, block_y as u32, format, options, row);
            parallel_progress.submit(1);
            Ok(())
        })?;

    parallel_progress.check_cancelled()?;
    writer.write_all(&buffer)?;
    parallel_progress.submit(1);

    Ok(())
}

/// Encodes one row of blocks into `out`.
///
/// This is the fan-out unit of parallel encoding: every block is a pure
/// function of its pixels and the options, so rows can be encoded in any
/// order.
fn encode_block_row(
    image: ImageView,
    block_y: u32,
    format: Format,
    options: &EncodeOptions,
    out: &mut [u8],
) {
    let bytes_per_block = format.bytes_per_block() as usize;
    debug_assert_eq!(out.len() % bytes_per_block, 0);

    for (block_x, encoded) in out.chunks_exact_mut(bytes_per_block).enumerate() {
        let block = read_block(&image, block_x as u32, block_y);

        let color_offset = match format {
            Format::Bc1 => 0,
            Format::Bc3 => {
                let alphas = block_alphas(&block);
                encoded[..8].copy_from_slice(&compress_alpha_block(&alphas, options.speed));
                8
            }
        };

        let weights = channel_weights(&block, options);
        encoded[color_offset..color_offset + 8]
            .copy_from_slice(&compress_color_block(&block, weights, format, options));
    }
}

/// Encodes an RGBA 8-bit image into a freshly allocated buffer.
///
/// This is a convenience wrapper around [`encode()`] without progress
/// reporting or cancellation.
///
/// ## Panics
///
/// Panics if the encoded surface does not fit into memory.
pub fn encode_to_vec(
    image: ImageView,
    format: Format,
    options: &EncodeOptions,
) -> Result<Vec<u8>, EncodingError> {
    let bytes: usize = format
        .surface_bytes(image.size())
        .expect("surface too large")
        .try_into()
        .expect("surface too large");

    let mut buffer = Vec::with_capacity(bytes);
    encode(&mut buffer, image, format, None, options)?;

    debug_assert_eq!(buffer.len(), bytes);
    Ok(buffer)
}

/// The level of trade-off between compression quality and speed.
///
/// `Normal` races the 3-point and 4-point color ramps per BC1 block and uses
/// tighter alpha search constants. The fast tiers always use the 4-point
/// ramp and a coarser alpha search; `SuperFast` is reserved for future
/// shortcuts and currently encodes like `Fast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Speed {
    #[default]
    Normal,
    Fast,
    SuperFast,
}

/// Options for encoding images.
///
/// The options are fixed for a whole pass: the encoder never mutates them,
/// and every block of an image is encoded under the same configuration.
///
/// ## See also
///
/// - [`encode`]
/// - [`encode_to_vec`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct EncodeOptions {
    /// Whether the per-channel error is weighted perceptually.
    ///
    /// When enabled, green error counts the most and blue the least,
    /// roughly following each channel's luminance contribution. When
    /// disabled, all channels are weighted equally.
    ///
    /// Default: `true`
    pub channel_weighting: bool,
    /// Whether the perceptual weights adapt to each block.
    ///
    /// Skews the channel weights towards the dominant channels of the block
    /// being encoded. Ignored unless [`channel_weighting`](Self::channel_weighting)
    /// is enabled.
    ///
    /// Default: `true`
    pub adaptive_weighting: bool,
    /// Whether endpoint refinement jitters all three channels jointly.
    ///
    /// The joint sweep is exhaustive over `(2 * refinement_steps + 1)^6`
    /// combinations and correspondingly slow. The default refines each
    /// channel separately.
    ///
    /// Default: `false`
    pub refine_3d: bool,
    /// The radius, in quantization-grid steps, of the endpoint refinement
    /// search. Values are clamped to 8; `0` disables refinement.
    ///
    /// Default: `1`
    pub refinement_steps: u8,
    /// The compression speed.
    ///
    /// Default: [`Speed::Normal`]
    pub speed: Speed,
    /// Whether BC1 blocks use punch-through transparency.
    ///
    /// Pixels with an alpha below [`alpha_threshold`](Self::alpha_threshold)
    /// are assigned the decoder's transparent palette slot and excluded from
    /// the color fit. Ignored for BC3, which stores alpha separately.
    ///
    /// Default: `false`
    pub punch_through_alpha: bool,
    /// The alpha value below which a pixel counts as transparent for
    /// punch-through encoding.
    ///
    /// Default: `128`
    pub alpha_threshold: u8,
    /// Whether to use rayon for parallel encoding.
    ///
    /// Ignored unless the `rayon` feature is enabled. Parallel and serial
    /// encoding produce byte-identical output.
    ///
    /// Default: `true`
    pub parallel: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            channel_weighting: true,
            adaptive_weighting: true,
            refine_3d: false,
            refinement_steps: 1,
            speed: Speed::Normal,
            punch_through_alpha: false,
            alpha_threshold: 128,
            parallel: true,
        }
    }
}
