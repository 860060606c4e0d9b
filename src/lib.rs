//! A software encoder for the BC1 (`DXT1`) and BC3 (`DXT5`) texture
//! compression formats.
//!
//! The encoder consumes an RGBA 8-bit raster and produces the raw block
//! data that GPUs decompress in hardware: 8 bytes per 4x4 pixel block for
//! BC1, 16 bytes for BC3. It has no notion of any container format; writing
//! DDS/KTX headers, mipmap chains, or texture arrays is up to the caller.
//!
//! Endpoints are fitted with a weighted cluster fit (an alternating
//! projection between index assignment and line re-derivation) followed by
//! a local search on the quantization grid, which is the same family of
//! algorithms hardware vendors ship in their offline compressors.
//!
//! # Example
//!
//! ```
//! use dxtc::{encode_to_vec, EncodeOptions, Format, ImageView, Size};
//!
//! let pixels = vec![255_u8; 16 * 16 * 4];
//! let image = ImageView::new(&pixels, Size::new(16, 16))?;
//!
//! let encoded = encode_to_vec(image, Format::Bc1, &EncodeOptions::default())?;
//! assert_eq!(encoded.len(), 4 * 4 * 8);
//! # Ok::<(), dxtc::EncodingError>(())
//! ```
//!
//! Encoding is deterministic: the same image and options always produce
//! byte-identical output, with or without parallelism.

#![forbid(unsafe_code)]

mod encode;
mod error;
mod format;
mod image;
mod progress;
mod util;

pub use encode::*;
pub use error::*;
pub use format::*;
pub use image::*;
pub use progress::*;
