//! Portable Network Graphics packing, Data Representation Template 5.41
//! (C6). Samples are stored as a single-row image whose color type and bit
//! depth are chosen to cover the packed level's dynamic range (8/16-bit
//! grayscale, 24-bit RGB, or 32-bit RGBA), then simple-packed in the same
//! way as DRT 5.0.

use png::{BitDepth, ColorType, Decoder, Encoder};

use crate::packing::{PackingError, SimplePackingParam};

/// Decodes a PNG payload back into physical values via `param`'s
/// simple-packing formula, recombining multi-channel pixels (RGB/RGBA) back
/// into one sample per pixel the same way [`pack`] split them apart.
pub fn unpack(payload: &[u8], param: &SimplePackingParam, num_points: usize) -> Result<Vec<f32>, PackingError> {
    let cursor = std::io::Cursor::new(payload);
    let decoder = Decoder::new(cursor);
    let mut reader = decoder
        .read_info()
        .map_err(|e| PackingError::Other(format!("reading PNG header failed: {e}")))?;
    let buf_size = reader
        .output_buffer_size()
        .ok_or_else(|| PackingError::Other("PNG output buffer size unavailable".into()))?;
    let mut raw = vec![0u8; buf_size];
    let info = reader
        .next_frame(&mut raw)
        .map_err(|e| PackingError::Other(format!("decoding PNG frame failed: {e}")))?;
    raw.truncate(info.buffer_size());

    let samples: Vec<u32> = match (info.color_type, info.bit_depth) {
        (ColorType::Grayscale, BitDepth::Eight) => raw.iter().map(|&b| u32::from(b)).collect(),
        (ColorType::Grayscale, BitDepth::Sixteen) => raw
            .chunks_exact(2)
            .map(|c| u32::from(u16::from_be_bytes([c[0], c[1]])))
            .collect(),
        (ColorType::Rgb, BitDepth::Eight) => raw
            .chunks_exact(3)
            .map(|c| (u32::from(c[0]) << 16) | (u32::from(c[1]) << 8) | u32::from(c[2]))
            .collect(),
        (ColorType::Rgba, BitDepth::Eight) => raw
            .chunks_exact(4)
            .map(|c| (u32::from(c[0]) << 24) | (u32::from(c[1]) << 16) | (u32::from(c[2]) << 8) | u32::from(c[3]))
            .collect(),
        _ => return Err(PackingError::Other("unsupported PNG color type / bit depth combination".into())),
    };

    if samples.len() != num_points {
        return Err(PackingError::LengthMismatch);
    }

    Ok(samples.into_iter().map(|s| param.decode_level(s)).collect())
}

/// Picks the PNG color type/bit depth pair that covers `nbits` of dynamic
/// range per pixel: grayscale at 8 or 16 bits, RGB at 24, RGBA at 32.
fn depth_for_nbits(nbits: u8) -> Result<(ColorType, BitDepth), PackingError> {
    match nbits {
        0 => Err(PackingError::InvalidParameter("nbits")),
        1..=8 => Ok((ColorType::Grayscale, BitDepth::Eight)),
        9..=16 => Ok((ColorType::Grayscale, BitDepth::Sixteen)),
        17..=24 => Ok((ColorType::Rgb, BitDepth::Eight)),
        25..=32 => Ok((ColorType::Rgba, BitDepth::Eight)),
        _ => Err(PackingError::InvalidParameter("nbits")),
    }
}

/// Packs `levels` (already simple-packing-encoded integer levels, `nbits`
/// wide) into a single-row PNG image, picking grayscale/RGB/RGBA and 8/16
/// bits per channel to cover `nbits` of dynamic range. A degenerate `width
/// < 1` or `height < 1` is rewritten to a single zero pixel, matching the
/// raster codecs' shared convention for keeping the output parseable.
pub fn pack(levels: &[u32], width: usize, height: usize, nbits: u8) -> Result<Vec<u8>, PackingError> {
    let (width, height, levels) = if width < 1 || height < 1 {
        log::warn!("raster packing requested degenerate dimensions {width}x{height}; rewriting to 1x1");
        (1, 1, &[0u32][..])
    } else {
        (width, height, levels)
    };

    if levels.len() != width * height {
        return Err(PackingError::LengthMismatch);
    }
    let (color, depth) = depth_for_nbits(nbits)?;

    let mut raw = Vec::new();
    match (color, depth) {
        (ColorType::Grayscale, BitDepth::Eight) => raw.extend(levels.iter().map(|&v| v as u8)),
        (ColorType::Grayscale, BitDepth::Sixteen) => {
            for &v in levels {
                raw.extend_from_slice(&(v as u16).to_be_bytes());
            }
        }
        (ColorType::Rgb, _) => {
            for &v in levels {
                raw.extend_from_slice(&[(v >> 16) as u8, (v >> 8) as u8, v as u8]);
            }
        }
        (ColorType::Rgba, _) => {
            for &v in levels {
                raw.extend_from_slice(&[(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]);
            }
        }
        _ => unreachable!("depth_for_nbits only returns the combinations matched above"),
    }

    let mut out = Vec::new();
    {
        let mut encoder = Encoder::new(&mut out, width as u32, height as u32);
        encoder.set_color(color);
        encoder.set_depth(depth);
        let mut writer = encoder
            .write_header()
            .map_err(|e| PackingError::Other(format!("writing PNG header failed: {e}")))?;
        writer
            .write_image_data(&raw)
            .map_err(|e| PackingError::Other(format!("writing PNG frame failed: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_roundtrips() {
        let param = SimplePackingParam {
            ref_val: 0.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 8,
        };
        let levels: Vec<u32> = vec![0, 10, 20, 255, 128, 64];
        let png_bytes = pack(&levels, 3, 2, 8).unwrap();
        let decoded = unpack(&png_bytes, &param, levels.len()).unwrap();
        let expected: Vec<f32> = levels.iter().map(|&l| param.decode_level(l)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn rejects_length_mismatch_on_pack() {
        assert!(pack(&[1, 2, 3], 2, 2, 8).is_err());
    }

    #[test]
    fn sixteen_bit_range_selects_grayscale_sixteen() {
        let param = SimplePackingParam {
            ref_val: 0.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 16,
        };
        let levels: Vec<u32> = vec![0, 1000, 40_000, 65_535];
        let png_bytes = pack(&levels, 4, 1, 16).unwrap();
        let decoded = unpack(&png_bytes, &param, levels.len()).unwrap();
        let expected: Vec<f32> = levels.iter().map(|&l| param.decode_level(l)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn twenty_bit_range_round_trips_via_rgb() {
        let param = SimplePackingParam {
            ref_val: 0.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 20,
        };
        let levels: Vec<u32> = vec![0, 12_345, 1_048_575, 500_000];
        let png_bytes = pack(&levels, 4, 1, 20).unwrap();
        let decoded = unpack(&png_bytes, &param, levels.len()).unwrap();
        let expected: Vec<f32> = levels.iter().map(|&l| param.decode_level(l)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn thirty_two_bit_range_round_trips_via_rgba() {
        let param = SimplePackingParam {
            ref_val: 0.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 32,
        };
        let levels: Vec<u32> = vec![0, u32::MAX, 0x01_02_03_04];
        let png_bytes = pack(&levels, 3, 1, 32).unwrap();
        let decoded = unpack(&png_bytes, &param, levels.len()).unwrap();
        let expected: Vec<f32> = levels.iter().map(|&l| param.decode_level(l)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn rejects_nbits_over_32() {
        assert_eq!(
            depth_for_nbits(33).unwrap_err(),
            PackingError::InvalidParameter("nbits")
        );
    }

    #[test]
    fn degenerate_dimensions_rewrite_to_one_by_one() {
        let png_bytes = pack(&[], 0, 5, 8).unwrap();
        let param = SimplePackingParam {
            ref_val: 0.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 8,
        };
        let decoded = unpack(&png_bytes, &param, 1).unwrap();
        assert_eq!(decoded, vec![0.0]);
    }
}
