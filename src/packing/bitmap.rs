//! Bitmap contraction: grid points a bitmap marks absent decode to `NaN`;
//! on encode, values equal to `NaN` are dropped from the packed payload and
//! recorded as zero bits.

use super::PackingError;

const MASK: u8 = 0b1000_0000;

fn bit_at(bitmap: &[u8], offset: usize) -> bool {
    let byte = bitmap[offset / 8];
    byte & (MASK >> (offset % 8)) != 0
}

/// Expands `values` (one per set bit in `bitmap`) back to one value per grid
/// point, filling unset positions with `NaN`.
pub fn expand(values: &[f32], bitmap: &[u8], num_points: usize) -> Result<Vec<f32>, PackingError> {
    if bitmap.len() * 8 < num_points {
        return Err(PackingError::LengthMismatch);
    }

    let mut out = Vec::with_capacity(num_points);
    let mut values = values.iter();
    for offset in 0..num_points {
        if bit_at(bitmap, offset) {
            out.push(*values.next().ok_or(PackingError::LengthMismatch)?);
        } else {
            out.push(f32::NAN);
        }
    }
    Ok(out)
}

/// Inverse of [`expand`]: returns the contracted (non-`NaN`) values plus the
/// bitmap octets marking which grid points they came from.
pub fn contract(values: &[f32]) -> (Vec<f32>, Vec<u8>) {
    let mut bitmap = vec![0u8; num_octets_for_bitmap(values.len())];
    let mut dense = Vec::with_capacity(values.len());
    for (offset, v) in values.iter().enumerate() {
        if !v.is_nan() {
            bitmap[offset / 8] |= MASK >> (offset % 8);
            dense.push(*v);
        }
    }
    (dense, bitmap)
}

/// All-ones bitmap for a field with no missing grid points, as Section 6
/// with `bitmap_indicator == 255` implies.
pub fn all_present(num_points: usize) -> Vec<u8> {
    vec![0xffu8; num_octets_for_bitmap(num_points)]
}

fn num_octets_for_bitmap(num_points: usize) -> usize {
    (num_points + 7) / 8
}
