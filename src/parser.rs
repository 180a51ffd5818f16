//! Field extraction (C9): walks a decoded section table and unpacks
//! individual fields, dispatching to the C4/C5/C6/C7 unpack halves by Data
//! Representation Template number, matching the representation template
//! number against every packer this crate's registry knows about.

use crate::context::{BitMap, Grib2, GridDefinition, Identification, ProdDefinition, ReprDefinition};
use crate::error::{DecodeError, GribError};
use crate::grid::{LatLonGridDefinition, ScanningMode};
use crate::helpers::grib_int_from_bytes;
use crate::packing::complex::diff::Order;
use crate::packing::{bitmap, complex, raster, simple, spectral, SimplePackingParam};
use crate::reader::{Grib2Read, SeekableGrib2Reader};

/// Sentinel meaning "any discipline matches" in [`FieldQuery::discipline`].
pub const WILDCARD_DISCIPLINE: i64 = -1;
/// Sentinel meaning "any template number matches" in [`FieldQuery::prod_tmpl_num`]
/// / [`FieldQuery::grid_tmpl_num`].
pub const WILDCARD_TEMPLATE: i64 = -1;
/// Sentinel meaning "any value at this position matches" in the per-field
/// query arrays.
pub const WILDCARD: i64 = -9999;

/// A wildcarded query over discipline, Identification fields, and decoded
/// Product/Grid Definition Template values.
#[derive(Debug, Clone, Default)]
pub struct FieldQuery {
    pub discipline: i64,
    pub ids_query: Vec<i64>,
    pub prod_tmpl_num: i64,
    pub pdt_query: Vec<i64>,
    pub grid_tmpl_num: i64,
    pub gdt_query: Vec<i64>,
}

impl FieldQuery {
    /// Matches everything: an empty query with every sentinel at its
    /// wildcard value.
    pub fn any() -> Self {
        Self {
            discipline: WILDCARD_DISCIPLINE,
            ids_query: Vec::new(),
            prod_tmpl_num: WILDCARD_TEMPLATE,
            pdt_query: Vec::new(),
            grid_tmpl_num: WILDCARD_TEMPLATE,
            gdt_query: Vec::new(),
        }
    }

    pub(crate) fn matches(&self, discipline: u8, id: &Identification, grid: &GridDefinition, prod: &ProdDefinition) -> bool {
        if self.discipline != WILDCARD_DISCIPLINE && self.discipline != i64::from(discipline) {
            return false;
        }
        if !query_matches(&self.ids_query, &identification_fields(id)) {
            return false;
        }
        if self.grid_tmpl_num != WILDCARD_TEMPLATE && self.grid_tmpl_num != i64::from(grid.grid_tmpl_num) {
            return false;
        }
        if !query_matches(&self.gdt_query, grid.fields()) {
            return false;
        }
        if self.prod_tmpl_num != WILDCARD_TEMPLATE && self.prod_tmpl_num != i64::from(prod.prod_tmpl_num) {
            return false;
        }
        if !query_matches(&self.pdt_query, prod.fields()) {
            return false;
        }
        true
    }
}

fn query_matches(query: &[i64], decoded: &[i64]) -> bool {
    query.iter().zip(decoded.iter()).all(|(q, v)| *q == WILDCARD || *q == *v)
}

/// Section 1 fields in declaration order, the basis against which
/// [`FieldQuery::ids_query`] positions are matched.
fn identification_fields(id: &Identification) -> [i64; 9] {
    [
        i64::from(id.centre_id),
        i64::from(id.subcentre_id),
        i64::from(id.master_table_version),
        i64::from(id.local_table_version),
        i64::from(id.ref_time_significance),
        i64::from(id.prod_status),
        i64::from(id.data_type),
        0,
        0,
    ]
}

/// A fully decoded field: everything `extract_field` read plus the unpacked,
/// bitmap-expanded grid-point values. Ordinary ownership releases it; no
/// explicit `gf_free` call is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct GribField {
    pub discipline: u8,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub num_points: u32,
    pub prod_definition: ProdDefinition,
    pub repr_definition: ReprDefinition,
    pub bitmap_indicator: u8,
    pub values: Vec<f32>,
    pub scanning_mode: Option<ScanningMode>,
}

/// Parses the section framing of a GRIB2 message and extracts fields from it
/// on demand: a read step followed by a decode step for whichever field a
/// query selects.
pub struct Grib2Message<R> {
    inner: Grib2<R>,
}

impl<R: Grib2Read> Grib2Message<R> {
    pub fn from_reader(r: R) -> Result<Self, GribError> {
        Ok(Self { inner: Grib2::read(r)? })
    }

    /// Walks submessages in file order, skips `skip` matches before the one
    /// returned, and decodes the first submessage whose discipline/PDT/GDT
    /// satisfy `query`.
    pub fn extract_field(&self, skip: usize, query: &FieldQuery) -> Result<GribField, GribError> {
        let (indicator, _) = self.inner.info()?;
        let discipline = indicator.discipline;

        let mut remaining = skip;
        let mut last_bitmap: Option<Box<[u8]>> = None;

        for submessage in self.inner.submessages() {
            let grid = submessage.grid_def();
            let prod = submessage.prod_def();
            let id = submessage.identification();
            let repr = submessage.repr_def();
            let bitmap = submessage.bitmap_def();

            let resolved_bitmap = resolve_bitmap(bitmap, &mut last_bitmap)?;

            if !query.matches(discipline, id, grid, prod) {
                continue;
            }
            if remaining > 0 {
                remaining -= 1;
                continue;
            }

            let values = decode_values(repr, grid, submessage.payload(), resolved_bitmap.as_deref())?;
            return Ok(GribField {
                discipline,
                identification: id.clone(),
                grid_definition: grid.clone(),
                num_points: grid.num_points,
                prod_definition: prod.clone(),
                repr_definition: repr.clone(),
                bitmap_indicator: bitmap.bitmap_indicator,
                values,
                scanning_mode: LatLonGridDefinition::from_gdt_3_0_fields(grid.fields()).map(|g| g.scanning_mode),
            });
        }

        Err(DecodeError::UnclassifiedError("no field matched the query".to_owned()).into())
    }
}

impl<R: std::io::Read + std::io::Seek> Grib2Message<SeekableGrib2Reader<R>> {
    pub fn from_seekable(r: R) -> Result<Self, GribError> {
        Grib2Message::from_reader(SeekableGrib2Reader::new(r))
    }
}

/// Tracks the "most recently defined bitmap" rule: indicator 0 defines a
/// fresh bitmap and remembers it; indicator 254 reuses whatever was last
/// remembered; any other indicator carries no bitmap at all (`None` is
/// returned, and `expand`'s bitmap-expansion step is skipped by the caller
/// since the decoded values already cover every point).
fn resolve_bitmap<'a>(bitmap: &'a BitMap, last: &'a mut Option<Box<[u8]>>) -> Result<Option<Box<[u8]>>, GribError> {
    match bitmap.bitmap_indicator {
        0 => {
            *last = Some(bitmap.bitmap_bytes.clone());
            Ok(last.clone())
        }
        254 => last.clone().ok_or_else(|| DecodeError::UnclassifiedError("no prior bitmap to reuse".to_owned()).into()).map(Some),
        _ => Ok(None),
    }
}

fn decode_values(repr: &ReprDefinition, grid: &GridDefinition, payload: &[u8], bitmap_bytes: Option<&[u8]>) -> Result<Vec<f32>, GribError> {
    let dense = decode_dense(repr, grid, payload)?;

    match bitmap_bytes {
        Some(bytes) => Ok(bitmap::expand(&dense, bytes, grid.num_points as usize)?),
        None => Ok(dense),
    }
}

fn simple_packing_param(fields: &[i64]) -> Result<SimplePackingParam, GribError> {
    if fields.len() < 4 {
        return Err(DecodeError::LengthMismatch.into());
    }
    Ok(SimplePackingParam {
        ref_val: f32::from_bits(fields[0] as u32),
        binary_scale: fields[1] as i16,
        decimal_scale: fields[2] as i16,
        nbits: fields[3] as u8,
    })
}

fn decode_dense(repr: &ReprDefinition, grid: &GridDefinition, payload: &[u8]) -> Result<Vec<f32>, GribError> {
    let num_points = repr.num_points as usize;
    let fields = repr.fields();

    match repr.repr_tmpl_num {
        0 => {
            let param = simple_packing_param(fields)?;
            Ok(simple::unpack(payload, &param, num_points))
        }
        2 => decode_complex(fields, payload, false),
        3 => decode_complex(fields, payload, true),
        40 => decode_jpeg2000(fields, grid, payload, num_points),
        41 => decode_png(fields, payload, num_points),
        50 => {
            let param = simple_packing_param(fields)?;
            let truncation = spherical_truncation(grid)?;
            spectral::unpack_simple(payload, &param, truncation).map_err(GribError::from)
        }
        51 => {
            if fields.len() < 4 {
                return Err(DecodeError::LengthMismatch.into());
            }
            let leading = f32::from_bits(fields[0] as u32);
            let param = SimplePackingParam {
                ref_val: 0.0,
                binary_scale: fields[1] as i16,
                decimal_scale: fields[2] as i16,
                nbits: fields[3] as u8,
            };
            let truncation = spherical_truncation(grid)?;
            spectral::unpack_complex(leading, payload, &param, truncation).map_err(GribError::from)
        }
        n => Err(DecodeError::NotSupported("GRIB2 code table 5.0 (data representation template)", n).into()),
    }
}

#[cfg(feature = "jpeg2000-support-openjpeg")]
fn decode_jpeg2000(fields: &[i64], grid: &GridDefinition, payload: &[u8], num_points: usize) -> Result<Vec<f32>, GribError> {
    let param = simple_packing_param(fields)?;
    let (width, height) = raster_dims(grid, num_points)?;
    let levels = raster::jpeg2000::decode(payload, width, height)?;
    Ok(levels.into_iter().map(|lvl| param.decode_level(lvl as u32)).collect())
}

#[cfg(not(feature = "jpeg2000-support-openjpeg"))]
fn decode_jpeg2000(_fields: &[i64], _grid: &GridDefinition, _payload: &[u8], _num_points: usize) -> Result<Vec<f32>, GribError> {
    Err(DecodeError::NotSupported("GRIB2 code table 5.0 (data representation template)", 40).into())
}

#[cfg(feature = "png-support")]
fn decode_png(fields: &[i64], payload: &[u8], num_points: usize) -> Result<Vec<f32>, GribError> {
    let param = simple_packing_param(fields)?;
    raster::png::unpack(payload, &param, num_points).map_err(GribError::from)
}

#[cfg(not(feature = "png-support"))]
fn decode_png(_fields: &[i64], _payload: &[u8], _num_points: usize) -> Result<Vec<f32>, GribError> {
    Err(DecodeError::NotSupported("GRIB2 code table 5.0 (data representation template)", 41).into())
}

fn decode_complex(fields: &[i64], payload: &[u8], with_diff: bool) -> Result<Vec<f32>, GribError> {
    if fields.len() < 16 {
        return Err(DecodeError::LengthMismatch.into());
    }
    let decimal_scale = fields[2] as i16;
    let ref_width = fields[3] as u32;
    let ngroup = fields[9] as usize;
    let width_width = fields[11] as u32;
    let len_width = fields[15] as u32;

    let (spatial_diff_order, rest) = if with_diff {
        if fields.len() < 18 {
            return Err(DecodeError::LengthMismatch.into());
        }
        let order = match fields[16] {
            1 => Order::First,
            2 => Order::Second,
            n => return Err(DecodeError::NotSupported("GRIB2 code table 5.6 (order of spatial differencing)", n as u16).into()),
        };
        let num_octets = fields[17] as usize;
        let leading_count = if order == Order::First { 1 } else { 2 };
        // leading_count first values plus one overall-minimum extension field.
        let prefix_len = (leading_count + 1) * num_octets;
        let prefix = payload.get(..prefix_len).ok_or(DecodeError::LengthMismatch)?;
        let mut chunks = prefix.chunks_exact(num_octets);
        let first_values: Vec<i64> = (&mut chunks)
            .take(leading_count)
            .map(|c| i64::from(grib_int_from_bytes(c)))
            .collect();
        let minimum = i64::from(grib_int_from_bytes(chunks.next().ok_or(DecodeError::LengthMismatch)?));
        (Some((order, first_values, minimum)), &payload[prefix_len..])
    } else {
        (None, payload)
    };

    Ok(complex::unpack(rest, decimal_scale, ngroup, ref_width, width_width, len_width, spatial_diff_order))
}

fn spherical_truncation(grid: &GridDefinition) -> Result<spectral::Truncation, GribError> {
    let f = grid.fields();
    let get = |i: usize| f.get(i).copied().unwrap_or(0) as u32;
    Ok(spectral::Truncation { j: get(0), k: get(1), m: get(2) })
}

/// `(width, height)` a raster packer should read/write: bitmap-contracted
/// fields rasterize as a single row; otherwise the grid's own shape,
/// swapped if the "alternating rows" scan flag is set.
fn raster_dims(grid: &GridDefinition, num_packed_points: usize) -> Result<(usize, usize), GribError> {
    let ll = LatLonGridDefinition::from_gdt_3_0_fields(grid.fields())
        .ok_or(DecodeError::NotSupported("grid definition template", grid.grid_tmpl_num))?;
    let (ni, nj) = ll.raster_shape();
    if num_packed_points != ni * nj {
        return Ok((num_packed_points, 1));
    }
    Ok(if ll.scanning_mode.scans_alternating_rows() {
        (nj, ni)
    } else {
        (ni, nj)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identification() -> Identification {
        Identification {
            centre_id: 34,
            subcentre_id: 0,
            master_table_version: 5,
            local_table_version: 1,
            ref_time_significance: 0,
            ref_time: chrono::Utc::now(),
            prod_status: 0,
            data_type: 2,
        }
    }

    fn grid(fields: Vec<i64>) -> GridDefinition {
        GridDefinition {
            num_points: 6,
            grid_tmpl_num: 0,
            fields: fields.into_boxed_slice(),
            template_supported: true,
        }
    }

    fn prod(category: i64) -> ProdDefinition {
        let mut fields = vec![0i64; 15];
        fields[0] = category;
        ProdDefinition {
            num_coordinates: 0,
            prod_tmpl_num: 0,
            fields: fields.into_boxed_slice(),
            template_supported: true,
            vertical_coords: Box::new([]),
        }
    }

    #[test]
    fn wildcard_discipline_matches_anything() {
        let query = FieldQuery { discipline: WILDCARD_DISCIPLINE, ..FieldQuery::any() };
        assert!(query.matches(10, &identification(), &grid(vec![0; 19]), &prod(1)));
        assert!(query.matches(0, &identification(), &grid(vec![0; 19]), &prod(1)));
    }

    #[test]
    fn exact_discipline_rejects_mismatch() {
        let query = FieldQuery { discipline: 10, ..FieldQuery::any() };
        assert!(query.matches(10, &identification(), &grid(vec![0; 19]), &prod(1)));
        assert!(!query.matches(0, &identification(), &grid(vec![0; 19]), &prod(1)));
    }

    #[test]
    fn wildcarded_pdt_query_matches_one_position_only() {
        let query = FieldQuery {
            pdt_query: vec![WILDCARD, 2],
            ..FieldQuery::any()
        };
        let mut fields = vec![0i64; 15];
        fields[0] = 99; // wildcarded position, any value ok
        fields[1] = 2;
        let prod = ProdDefinition {
            num_coordinates: 0,
            prod_tmpl_num: 0,
            fields: fields.into_boxed_slice(),
            template_supported: true,
            vertical_coords: Box::new([]),
        };
        assert!(query.matches(0, &identification(), &grid(vec![0; 19]), &prod));
    }

    #[test]
    fn raster_dims_uses_grid_shape_when_not_contracted() {
        let mut fields = vec![0i64; 19];
        fields[7] = 4; // Ni
        fields[8] = 6; // Nj
        let g = grid(fields);
        assert_eq!(raster_dims(&g, 24).unwrap(), (4, 6));
    }

    #[test]
    fn raster_dims_collapses_to_one_row_when_bitmap_contracted() {
        let mut fields = vec![0i64; 19];
        fields[7] = 4;
        fields[8] = 6;
        let g = grid(fields);
        assert_eq!(raster_dims(&g, 5).unwrap(), (5, 1));
    }
}
