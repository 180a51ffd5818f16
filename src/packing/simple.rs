//! Data Representation Template 5.0: simple packing (C4). The encode
//! direction is the inverse of the decode arithmetic below.

use crate::bitio::{BitFieldIter, BitWriter};

use super::{PackingError, SimplePackingParam};

/// Decodes `nbits`-wide levels out of `payload` into physical values.
///
/// `nbits == 0` is the wgrib2 convention for a constant field: every grid
/// point takes the reference value.
pub fn unpack(payload: &[u8], param: &SimplePackingParam, num_points: usize) -> Vec<f32> {
    if param.nbits == 0 {
        let dig_factor = 10f32.powi(-i32::from(param.decimal_scale));
        return vec![param.ref_val * dig_factor; num_points];
    }

    BitFieldIter::new(payload, 0, param.nbits as u32, num_points)
        .map(|encoded| param.decode_level(encoded))
        .collect()
}

/// Picks `ref_val`/`binary_scale` so that `values` fit in `nbits` levels at
/// `decimal_scale` digits of precision, and packs them.
///
/// `nbits == 0` is "auto" rather than an error: a constant input (the whole
/// range collapses to one value) short-circuits to a zero-length payload
/// with `nbits = 0`, the wgrib2 convention `unpack` already decodes above.
/// Otherwise a zero `nbits` means "choose the smallest width that covers
/// the data's range", following `ceil(log2(range + 1))` with no additional
/// binary scaling.
pub fn pack(values: &[f32], decimal_scale: i16, nbits: u8) -> Result<(SimplePackingParam, Vec<u8>), PackingError> {
    if nbits > 32 {
        return Err(PackingError::InvalidParameter("nbits"));
    }
    if values.is_empty() {
        return Err(PackingError::InvalidParameter("values"));
    }

    let dec_factor = 10f64.powi(decimal_scale.into());
    let scaled: Vec<f64> = values.iter().map(|v| f64::from(*v) * dec_factor).collect();
    let min = scaled.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scaled.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if range <= 0.0 {
        let param = SimplePackingParam {
            ref_val: min as f32,
            binary_scale: 0,
            decimal_scale,
            nbits: 0,
        };
        return Ok((param, Vec::new()));
    }

    let nbits = if nbits == 0 {
        (range + 1.0).log2().ceil().max(1.0) as u8
    } else {
        nbits
    };

    let max_level = (1u64 << nbits) - 1;
    let binary_scale = ((range.log2() - (max_level as f64).log2()).ceil() as i32).max(0);
    let bin_factor = 2f64.powi(binary_scale);

    let mut writer = BitWriter::new();
    for v in &scaled {
        let level = (((v - min) / bin_factor).round() as u64).min(max_level);
        writer.write(nbits as u32, level as u64);
    }

    let param = SimplePackingParam {
        ref_val: min as f32,
        binary_scale: binary_scale as i16,
        decimal_scale,
        nbits,
    };
    Ok((param, writer.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_roundtrips_within_precision() {
        let values = vec![10.0, 10.5, 11.0, 9.75, 10.25];
        let (param, payload) = pack(&values, 2, 12).unwrap();
        let decoded = unpack(&payload, &param, values.len());
        for (a, b) in decoded.iter().zip(values.iter()) {
            assert!((a - b).abs() < 0.01, "{a} vs {b}");
        }
    }

    #[test]
    fn zero_bits_decodes_to_constant_field() {
        let param = SimplePackingParam {
            ref_val: 42.0,
            binary_scale: 0,
            decimal_scale: 0,
            nbits: 0,
        };
        let decoded = unpack(&[], &param, 5);
        assert_eq!(decoded, vec![42.0; 5]);
    }

    #[test]
    fn pack_auto_selects_width_when_nbits_is_zero() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let (param, payload) = pack(&values, 0, 0).unwrap();
        assert!(param.nbits > 0 && param.nbits <= 8);
        let decoded = unpack(&payload, &param, values.len());
        for (a, b) in decoded.iter().zip(values.iter()) {
            assert!((a - b).abs() < 1.0, "{a} vs {b}");
        }
    }

    #[test]
    fn pack_short_circuits_constant_data_to_zero_bits() {
        let values = vec![42.0; 6];
        let (param, payload) = pack(&values, 1, 12).unwrap();
        assert_eq!(param.nbits, 0);
        assert!(payload.is_empty());
        let decoded = unpack(&payload, &param, values.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn pack_rejects_too_wide_nbits() {
        assert_eq!(
            pack(&[1.0], 0, 33).unwrap_err(),
            PackingError::InvalidParameter("nbits")
        );
    }
}
