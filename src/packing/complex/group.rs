//! Group-wise packing shared by Data Representation Templates 5.2 and 5.3
//! (C5). Values are split into groups of near-equal magnitude; each group
//! stores its own reference value and bit width, and group widths/lengths
//! are themselves packed as two more bit-planes.

use crate::bitio::{get_bits, BitFieldIter, BitWriter};
use crate::helpers::{sign_magnitude_decode, sign_magnitude_encode};

/// One run of `length` consecutive values sharing `reference`/`width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Group {
    pub reference: i64,
    pub width: u8,
    pub length: u32,
}

/// Splits `deltas` into groups, growing each run while the bit width needed
/// to cover it stays flat and capping every group at `max_group_len`. A
/// greedy grouper, simpler than the optimal dynamic-programming partition
/// NCEPLIBS-g2 uses, but it produces the same group/width/length shape.
pub fn split_into_groups(deltas: &[i64], max_group_len: u32) -> Vec<Group> {
    let mut groups = Vec::new();
    let mut i = 0;
    while i < deltas.len() {
        let mut lo = deltas[i];
        let mut hi = deltas[i];
        let mut len = 1u32;
        while i + (len as usize) < deltas.len() && len < max_group_len {
            let candidate = deltas[i + len as usize];
            let new_lo = lo.min(candidate);
            let new_hi = hi.max(candidate);
            if width_for_range(new_lo, new_hi) > 32 {
                break;
            }
            lo = new_lo;
            hi = new_hi;
            len += 1;
        }
        groups.push(Group {
            reference: lo,
            width: width_for_range(lo, hi),
            length: len,
        });
        i += len as usize;
    }
    groups
}

fn width_for_range(lo: i64, hi: i64) -> u8 {
    let range = (hi - lo) as u64;
    bits_needed(range)
}

fn bits_needed(value: u64) -> u8 {
    (64 - value.leading_zeros()) as u8
}

/// Sign-magnitude bit width needed to store `value` (magnitude bits plus a
/// sign bit), matching the GRIB2 convention used for signed template and
/// group-reference fields.
fn signed_width(value: i64) -> u8 {
    bits_needed(value.unsigned_abs()).max(1) + 1
}

/// Packs the value payload (group references already subtracted out by the
/// caller) plus the three group-descriptor bit-planes, matching Section 7's
/// layout for DRT 5.2/5.3: group references, group widths, group lengths,
/// then the per-group packed values.
pub fn pack(groups: &[Group], deltas: &[i64]) -> Vec<u8> {
    let ref_width = groups
        .iter()
        .map(|g| signed_width(g.reference))
        .max()
        .unwrap_or(1) as u32;
    let max_width = groups.iter().map(|g| g.width).max().unwrap_or(0);
    let width_width = bits_needed(u64::from(max_width)).max(1) as u32;
    let max_len = groups.iter().map(|g| g.length).max().unwrap_or(0);
    let len_width = bits_needed(u64::from(max_len)).max(1) as u32;

    let mut writer = BitWriter::new();
    for g in groups {
        writer.write(ref_width, sign_magnitude_encode(g.reference, ref_width));
    }
    for g in groups {
        writer.write(width_width, u64::from(g.width));
    }
    for g in groups {
        writer.write(len_width, u64::from(g.length));
    }

    let mut offset = 0usize;
    for g in groups {
        for _ in 0..g.length {
            let value = (deltas[offset] - g.reference) as u64;
            writer.write(u32::from(g.width), value);
            offset += 1;
        }
    }

    writer.into_bytes()
}

/// Widths of the three descriptor planes `pack` chose, needed by `unpack`
/// to find where the value plane starts. Callers typically get these from
/// the already-decoded Data Representation Template fields instead.
pub fn descriptor_widths(groups: &[Group]) -> (u32, u32, u32) {
    let ref_width = groups
        .iter()
        .map(|g| signed_width(g.reference))
        .max()
        .unwrap_or(1) as u32;
    let max_width = groups.iter().map(|g| g.width).max().unwrap_or(0);
    let width_width = bits_needed(u64::from(max_width)).max(1) as u32;
    let max_len = groups.iter().map(|g| g.length).max().unwrap_or(0);
    let len_width = bits_needed(u64::from(max_len)).max(1) as u32;
    (ref_width, width_width, len_width)
}

/// Inverse of [`pack`]: `ngroup` groups, each descriptor plane `nbits` wide.
pub fn unpack(
    payload: &[u8],
    ngroup: usize,
    ref_width: u32,
    width_width: u32,
    len_width: u32,
) -> (Vec<Group>, Vec<i64>) {
    let refs: Vec<i64> = BitFieldIter::new(payload, 0, ref_width, ngroup)
        .map(|v| sign_magnitude_decode(u64::from(v), ref_width))
        .collect();
    let mut pos = ngroup * ref_width as usize;

    let widths: Vec<u8> = BitFieldIter::new(payload, pos, width_width, ngroup)
        .map(|v| v as u8)
        .collect();
    pos += ngroup * width_width as usize;

    let lengths: Vec<u32> = BitFieldIter::new(payload, pos, len_width, ngroup).collect();
    pos += ngroup * len_width as usize;

    let groups: Vec<Group> = (0..ngroup)
        .map(|i| Group {
            reference: refs[i],
            width: widths[i],
            length: lengths[i],
        })
        .collect();

    let mut values = Vec::new();
    for g in &groups {
        for _ in 0..g.length {
            let v = get_bits(payload, pos, u32::from(g.width));
            values.push(g.reference + v as i64);
            pos += g.width as usize;
        }
    }

    (groups, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_then_unpack_roundtrips() {
        let deltas = vec![10i64, 11, 10, 12, 100, 101, 102, 99];
        let groups = split_into_groups(&deltas, 4);
        let (ref_width, width_width, len_width) = descriptor_widths(&groups);

        let packed = pack(&groups, &deltas);
        let (decoded_groups, decoded_values) =
            unpack(&packed, groups.len(), ref_width, width_width, len_width);
        assert_eq!(decoded_groups.len(), groups.len());
        assert_eq!(decoded_values, deltas);
    }

    #[test]
    fn handles_negative_group_references() {
        let deltas = vec![-5i64, -4, -6, -3];
        let groups = split_into_groups(&deltas, 4);
        let (ref_width, width_width, len_width) = descriptor_widths(&groups);
        let packed = pack(&groups, &deltas);
        let (_, decoded_values) = unpack(&packed, groups.len(), ref_width, width_width, len_width);
        assert_eq!(decoded_values, deltas);
    }
}
