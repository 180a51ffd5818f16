//! Data Representation Templates 5.2 (complex packing) and 5.3 (complex
//! packing with spatial differencing), C5.
//!
//! Unlike simple packing, the reference/binary-scale pair in Section 5 is
//! folded into each group's own reference rather than one field-wide
//! offset, so decode here only needs the decimal scale to turn absolute
//! scaled integer levels back into physical values.

pub mod diff;
pub mod group;

use super::{PackingError, SimplePackingParam};
use diff::Order;
use group::Group;

/// Decodes a DRT 5.2/5.3 payload back into physical values.
///
/// `spatial_diff` is `None` for 5.2 and `Some((order, first_values,
/// minimum))` for 5.3, `minimum` being the overall minimum of the
/// differenced series that group packing normalized out before packing.
pub fn unpack(
    payload: &[u8],
    decimal_scale: i16,
    ngroup: usize,
    ref_width: u32,
    width_width: u32,
    len_width: u32,
    spatial_diff: Option<(Order, Vec<i64>, i64)>,
) -> Vec<f32> {
    let (_, deltas) = group::unpack(payload, ngroup, ref_width, width_width, len_width);

    let levels = match spatial_diff {
        Some((order, first_values, minimum)) => {
            let restored: Vec<i64> = deltas.iter().map(|d| d + minimum).collect();
            diff::undo(&first_values, &restored, order)
        }
        None => deltas,
    };

    let dec_factor = 10f64.powi(-i32::from(decimal_scale));
    levels.into_iter().map(|lvl| (lvl as f64 * dec_factor) as f32).collect()
}

/// Packs `values` using group packing, optionally preceded by spatial
/// differencing. Returns the Section 5 simple-packing parameters to record
/// (reference value and binary scale are both zero: group references carry
/// the field's offset instead), the group descriptors, the packed Section 7
/// payload, and, when `order` is given, the leading values plus the overall
/// minimum of the differenced series that DRT 5.3 stores as extension
/// fields ahead of the group-packed plane.
pub fn pack(
    values: &[f32],
    decimal_scale: i16,
    order: Option<Order>,
    max_group_len: u32,
) -> Result<(SimplePackingParam, Vec<Group>, Vec<u8>, Option<(Vec<i64>, i64)>), PackingError> {
    if values.is_empty() {
        return Err(PackingError::InvalidParameter("values"));
    }

    let dec_factor = 10f64.powi(decimal_scale.into());
    let levels: Vec<i64> = values
        .iter()
        .map(|v| (f64::from(*v) * dec_factor).round() as i64)
        .collect();

    let (spatial_diff, deltas) = match order {
        Some(o) => {
            let (first_values, minimum, normalized) = diff::apply(&levels, o);
            (Some((first_values, minimum)), normalized)
        }
        None => (None, levels),
    };

    let groups = group::split_into_groups(&deltas, max_group_len);
    let bytes = group::pack(&groups, &deltas);

    let param = SimplePackingParam {
        ref_val: 0.0,
        binary_scale: 0,
        decimal_scale,
        nbits: groups.iter().map(|g| g.width).max().unwrap_or(0),
    };
    Ok((param, groups, bytes, spatial_diff))
}
