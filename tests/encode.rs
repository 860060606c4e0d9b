use dxtc::{
    encode, encode_to_vec, CancellationToken, EncodeOptions, EncodingError, Format, ImageView,
    Progress, Size, Speed,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

mod util;

fn random_image(size: Size, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0_u8; size.pixels() as usize * 4];
    rng.fill(data.as_mut_slice());
    data
}

/// A 4x4 image where every pixel has the given RGBA value.
fn solid_tile(pixel: [u8; 4]) -> Vec<u8> {
    let mut data = Vec::with_capacity(16 * 4);
    for _ in 0..16 {
        data.extend_from_slice(&pixel);
    }
    data
}

fn uniform_options() -> EncodeOptions {
    let mut options = EncodeOptions::default();
    options.channel_weighting = false;
    options
}

#[test]
fn output_length_is_exact() {
    let sizes = [
        (1, 1),
        (3, 5),
        (4, 4),
        (5, 5),
        (7, 3),
        (8, 8),
        (16, 16),
        (31, 17),
    ];

    for format in [Format::Bc1, Format::Bc3] {
        for (width, height) in sizes {
            let size = Size::new(width, height);
            let data = random_image(size, 123);
            let image = ImageView::new(&data, size).unwrap();

            let encoded = encode_to_vec(image, format, &EncodeOptions::default()).unwrap();
            assert_eq!(
                encoded.len() as u64,
                format.surface_bytes(size).unwrap(),
                "{:?} {}x{}",
                format,
                width,
                height
            );
        }
    }
}

#[test]
fn encoding_is_deterministic() {
    let size = Size::new(20, 13);
    let data = random_image(size, 7);
    let image = ImageView::new(&data, size).unwrap();

    for format in [Format::Bc1, Format::Bc3] {
        let first = encode_to_vec(image, format, &EncodeOptions::default()).unwrap();
        let second = encode_to_vec(image, format, &EncodeOptions::default()).unwrap();
        assert_eq!(first, second, "{:?}", format);
    }
}

#[test]
fn parallel_matches_serial() {
    let size = Size::new(33, 29);
    let data = random_image(size, 99);
    let image = ImageView::new(&data, size).unwrap();

    let mut serial_options = EncodeOptions::default();
    serial_options.parallel = false;
    let mut parallel_options = EncodeOptions::default();
    parallel_options.parallel = true;

    for format in [Format::Bc1, Format::Bc3] {
        let serial = encode_to_vec(image, format, &serial_options).unwrap();
        let parallel = encode_to_vec(image, format, &parallel_options).unwrap();
        assert_eq!(serial, parallel, "{:?}", format);
    }
}

#[test]
fn solid_red_bc1_block() {
    let data = solid_tile([255, 0, 0, 255]);
    let image = ImageView::new(&data, Size::new(4, 4)).unwrap();

    let encoded = encode_to_vec(image, Format::Bc1, &EncodeOptions::default()).unwrap();
    assert_eq!(encoded.len(), 8);

    // both endpoints hold the same 565 red
    let c0 = u16::from_le_bytes([encoded[0], encoded[1]]);
    let c1 = u16::from_le_bytes([encoded[2], encoded[3]]);
    assert_eq!(c0, c1);
    assert_eq!(c0, 0b11111_000000_00000);

    // all 16 indices are 0
    assert_eq!(&encoded[4..], &[0, 0, 0, 0]);

    // and the block decodes losslessly
    let decoded = util::decode_bc1_block(encoded.as_slice().try_into().unwrap());
    assert_eq!(decoded, [[255, 0, 0, 255]; 16]);
}

#[test]
fn uniform_tiles_use_a_single_palette_entry() {
    // colors that survive 565 quantization exactly, so the flat fit wins
    for pixel in [[0, 0, 0, 255], [255, 255, 255, 255], [123, 44, 123, 255]] {
        let data = solid_tile(pixel);
        let image = ImageView::new(&data, Size::new(4, 4)).unwrap();
        let encoded = encode_to_vec(image, Format::Bc1, &EncodeOptions::default()).unwrap();

        let c0 = u16::from_le_bytes([encoded[0], encoded[1]]);
        let c1 = u16::from_le_bytes([encoded[2], encoded[3]]);
        assert_eq!(c0, c1, "{:?}", pixel);
        assert_eq!(&encoded[4..], &[0, 0, 0, 0], "{:?}", pixel);
    }
}

#[test]
fn representable_color_pairs_encode_exactly() {
    // all of these survive 565 quantization: their channels are exactly
    // what bit replication reconstructs
    let pairs = [
        ([0, 0, 0, 255], [255, 255, 255, 255]),
        ([255, 0, 0, 255], [0, 0, 255, 255]),
        ([66, 65, 66, 255], [8, 8, 8, 255]),
    ];

    for (p0, p1) in pairs {
        let mut data = Vec::new();
        for i in 0..16 {
            data.extend_from_slice(if i < 5 { &p0 } else { &p1 });
        }
        let image = ImageView::new(&data, Size::new(4, 4)).unwrap();
        let encoded = encode_to_vec(image, Format::Bc1, &uniform_options()).unwrap();

        let decoded = util::decode_bc1_block(encoded.as_slice().try_into().unwrap());
        for (i, pixel) in decoded.iter().enumerate() {
            let expected = if i < 5 { p0 } else { p1 };
            assert_eq!(*pixel, expected, "pair {:?}/{:?} pixel {}", p0, p1, i);
        }
    }
}

#[test]
fn edge_tiles_replicate_the_border() {
    // a 5x5 image encodes as 2x2 blocks; the partial blocks must behave as
    // if the last row/column were replicated outward
    let size = Size::new(5, 5);
    let mut data = vec![0_u8; 5 * 5 * 4];
    for y in 0..5 {
        for x in 0..5 {
            let i = (y * 5 + x) * 4;
            data[i] = (x * 50) as u8;
            data[i + 1] = (y * 50) as u8;
            data[i + 2] = 190;
            data[i + 3] = 255;
        }
    }
    let image = ImageView::new(&data, size).unwrap();
    let options = uniform_options();
    let encoded = encode_to_vec(image, Format::Bc1, &options).unwrap();
    assert_eq!(encoded.len(), 4 * 8);

    // rebuild each clamped tile as a standalone 4x4 image and compare
    let pixel_at = |x: usize, y: usize| {
        let i = (y.min(4) * 5 + x.min(4)) * 4;
        [data[i], data[i + 1], data[i + 2], data[i + 3]]
    };
    for block_y in 0..2 {
        for block_x in 0..2 {
            let mut tile = Vec::with_capacity(16 * 4);
            for py in 0..4 {
                for px in 0..4 {
                    tile.extend_from_slice(&pixel_at(block_x * 4 + px, block_y * 4 + py));
                }
            }
            let tile_image = ImageView::new(&tile, Size::new(4, 4)).unwrap();
            let expected = encode_to_vec(tile_image, Format::Bc1, &options).unwrap();

            let offset = (block_y * 2 + block_x) * 8;
            assert_eq!(
                &encoded[offset..offset + 8],
                expected.as_slice(),
                "block ({}, {})",
                block_x,
                block_y
            );
        }
    }
}

#[test]
fn bc3_blocks_store_alpha_first() {
    let data = solid_tile([10, 200, 30, 77]);
    let image = ImageView::new(&data, Size::new(4, 4)).unwrap();
    let encoded = encode_to_vec(image, Format::Bc3, &EncodeOptions::default()).unwrap();
    assert_eq!(encoded.len(), 16);

    let alphas = util::decode_alpha_block(encoded[..8].try_into().unwrap());
    assert_eq!(alphas, [77; 16]);

    let colors = util::decode_bc1_block(encoded[8..].try_into().unwrap());
    // BC3 color blocks are always 4-point mode, alpha comes from the alpha
    // block
    for pixel in colors {
        assert_eq!(pixel[3], 255);
    }
}

#[test]
fn pure_transparency_selects_the_anchored_alpha_ramp() {
    let mut data = Vec::new();
    for i in 0..16 {
        data.extend_from_slice(&[128, 128, 128, if i % 2 == 0 { 0 } else { 255 }]);
    }
    let image = ImageView::new(&data, Size::new(4, 4)).unwrap();
    let encoded = encode_to_vec(image, Format::Bc3, &EncodeOptions::default()).unwrap();

    // e0 <= e1 signals the 6-level ramp with its 0/255 anchors
    assert!(encoded[0] <= encoded[1]);

    let alphas = util::decode_alpha_block(encoded[..8].try_into().unwrap());
    for (i, &a) in alphas.iter().enumerate() {
        assert_eq!(a, if i % 2 == 0 { 0 } else { 255 });
    }
}

#[test]
fn four_level_alpha_scenario() {
    let levels = [0, 0, 0, 0, 255, 255, 255, 255, 128, 128, 128, 128, 64, 64, 64, 64];
    let mut data = Vec::new();
    for &a in &levels {
        data.extend_from_slice(&[90, 90, 90, a]);
    }
    let image = ImageView::new(&data, Size::new(4, 4)).unwrap();
    let encoded = encode_to_vec(image, Format::Bc3, &EncodeOptions::default()).unwrap();

    // the 8-level fit cannot hit all four levels, so the anchored ramp wins
    // with the two mid levels as endpoints
    assert!(encoded[0] <= encoded[1]);
    assert_eq!(encoded[0], 64);
    assert_eq!(encoded[1], 128);

    // every level decodes exactly, so equal inputs share their index
    let alphas = util::decode_alpha_block(encoded[..8].try_into().unwrap());
    assert_eq!(alphas, levels);
}

#[test]
fn refinement_never_worsens_the_error() {
    // a gradient tile that 565 endpoints cannot represent exactly
    let size = Size::new(4, 4);
    let mut data = Vec::new();
    for i in 0..16_u32 {
        let v = (i * 16 + 7) as u8;
        data.extend_from_slice(&[v, 255 - v, v / 2, 255]);
    }
    let image = ImageView::new(&data, size).unwrap();

    let mse_for = |steps: u8| {
        let mut options = uniform_options();
        options.refinement_steps = steps;
        let encoded = encode_to_vec(image, Format::Bc1, &options).unwrap();
        util::rgb_mse(&data, &util::decode_surface(&encoded, size, Format::Bc1))
    };

    let baseline = mse_for(0);
    for steps in [1, 2, 4, 8] {
        let refined = mse_for(steps);
        assert!(
            refined <= baseline,
            "steps {}: {} > {}",
            steps,
            refined,
            baseline
        );
    }
}

#[test]
fn refine_3d_never_worsens_the_error() {
    let size = Size::new(4, 4);
    let mut data = Vec::new();
    for i in 0..16_u32 {
        let v = (i * 15 + 3) as u8;
        data.extend_from_slice(&[v, v.wrapping_mul(3), 255 - v, 255]);
    }
    let image = ImageView::new(&data, size).unwrap();

    let mse_for = |refine_3d: bool, steps: u8| {
        let mut options = uniform_options();
        options.refine_3d = refine_3d;
        options.refinement_steps = steps;
        let encoded = encode_to_vec(image, Format::Bc1, &options).unwrap();
        util::rgb_mse(&data, &util::decode_surface(&encoded, size, Format::Bc1))
    };

    let baseline = mse_for(false, 0);
    assert!(mse_for(true, 1) <= baseline);
}

#[test]
fn fast_tiers_produce_valid_blocks() {
    let size = Size::new(12, 12);
    let data = random_image(size, 42);
    let image = ImageView::new(&data, size).unwrap();

    for speed in [Speed::Normal, Speed::Fast, Speed::SuperFast] {
        for format in [Format::Bc1, Format::Bc3] {
            let mut options = EncodeOptions::default();
            options.speed = speed;
            let encoded = encode_to_vec(image, format, &options).unwrap();
            assert_eq!(
                encoded.len() as u64,
                format.surface_bytes(size).unwrap(),
                "{:?} {:?}",
                speed,
                format
            );
            // decoding must not hit an out-of-range index or alpha table
            let _ = util::decode_surface(&encoded, size, format);
        }
    }
}

#[test]
fn cancellation_stops_the_encode() {
    let size = Size::new(64, 64);
    let data = random_image(size, 5);
    let image = ImageView::new(&data, size).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let mut reporter = |_: f32| {};
    let mut progress = Progress::new(&mut reporter).with_token(&token);

    let mut output = Vec::new();
    let result = encode(
        &mut output,
        image,
        Format::Bc1,
        Some(&mut progress),
        &EncodeOptions::default(),
    );
    assert!(matches!(result, Err(EncodingError::Cancelled)));
}

#[test]
fn progress_is_reported_and_monotone() {
    let size = Size::new(32, 32);
    let data = random_image(size, 11);
    let image = ImageView::new(&data, size).unwrap();

    let mut reports = Vec::new();
    let mut reporter = |p: f32| reports.push(p);
    let mut progress = Progress::new(&mut reporter);

    let mut options = EncodeOptions::default();
    options.parallel = false;

    let mut output = Vec::new();
    encode(&mut output, image, Format::Bc1, Some(&mut progress), &options).unwrap();

    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*reports.last().unwrap(), 1.0);
}

#[test]
fn invalid_views_are_rejected() {
    assert!(matches!(
        ImageView::new(&[], Size::new(0, 1)),
        Err(EncodingError::ZeroDimension)
    ));
    assert!(matches!(
        ImageView::new(&[0_u8; 20], Size::new(2, 2)),
        Err(EncodingError::UnexpectedBufferSize { expected: 16 })
    ));
}

#[test]
fn single_pixel_image_encodes_to_one_block() {
    let data = [200, 100, 50, 255];
    let image = ImageView::new(&data, Size::new(1, 1)).unwrap();
    let encoded = encode_to_vec(image, Format::Bc1, &EncodeOptions::default()).unwrap();
    assert_eq!(encoded.len(), 8);

    // the single pixel is replicated across the whole block
    let decoded = util::decode_bc1_block(encoded.as_slice().try_into().unwrap());
    let first = decoded[0];
    assert!(decoded.iter().all(|&p| p == first));
}
