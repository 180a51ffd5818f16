use std::io::Cursor;

use grib2::packing::bitmap;
use grib2::packing::complex::{diff, group};
use grib2::packing::raster::png;
use grib2::{
    FieldQuery, FieldSpec, FileHandle, IdentificationSpec, IndexCache, MessageAssembler, WILDCARD,
};

fn identification() -> IdentificationSpec {
    IdentificationSpec {
        centre_id: 34,
        subcentre_id: 0,
        master_table_version: 5,
        local_table_version: 1,
        ref_time_significance: 0,
        year: 2016,
        month: 8,
        day: 22,
        hour: 2,
        minute: 0,
        second: 0,
        prod_status: 0,
        data_type: 2,
    }
}

fn grid_values(ni: i64, nj: i64) -> Vec<i64> {
    let mut fields = vec![0i64; 19];
    fields[7] = ni;
    fields[8] = nj;
    fields
}

fn prod_values(category: i64, number: i64) -> Vec<i64> {
    let mut fields = vec![0i64; 15];
    fields[0] = category;
    fields[1] = number;
    fields
}

/// Sign-magnitude encoding mirroring the wire convention used for signed
/// template and extra-descriptor fields: the most significant bit of the
/// first octet is the sign, the rest is the magnitude.
fn encode_signed_octets(value: i64, num_octets: usize) -> Vec<u8> {
    let negative = value < 0;
    let mut magnitude = value.unsigned_abs();
    let mut bytes = vec![0u8; num_octets];
    for i in (0..num_octets).rev() {
        bytes[i] = (magnitude & 0xff) as u8;
        magnitude >>= 8;
    }
    if negative {
        bytes[0] |= 0x80;
    }
    bytes
}

/// Scenario 1: a 4x4 grid packed with PNG raster coding round-trips exactly.
#[test]
fn png_raster_round_trip_is_exact() {
    let values: Vec<f32> = (0..16).map(|i| i as f32).collect();
    let levels: Vec<u32> = values.iter().map(|&v| v as u32).collect();
    let payload = png::pack(&levels, 4, 4, 8).unwrap();

    // ref_val = 0.0 (bit pattern 0), binary_scale = 0, decimal_scale = 0, nbits = 8, type = 0.
    let repr_values = [0i64, 0, 0, 8, 0];

    let mut asm = MessageAssembler::new();
    asm.create(0, &identification()).unwrap();
    asm.add_grid(0, &grid_values(4, 4), 16).unwrap();
    asm.add_field(&FieldSpec {
        prod_tmpl_num: 0,
        prod_values: &prod_values(0, 1),
        vertical_coords: &[],
        repr_tmpl_num: 41,
        repr_values: &repr_values,
        bitmap_indicator: 255,
        bitmap: None,
        payload: &payload,
    })
    .unwrap();
    let bytes = asm.finalize().unwrap();

    let msg = grib2::Grib2Message::from_seekable(Cursor::new(bytes)).unwrap();
    let field = msg.extract_field(0, &FieldQuery::any()).unwrap();
    assert_eq!(field.values, values);
}

/// Scenario 2: a bitmap-contracted field decodes back to the present values,
/// with absent grid points recovered as `NaN` rather than the sentinel used
/// to mark them before contraction.
#[test]
fn bitmap_contracted_field_round_trips_present_values() {
    let missing = 9.0f32;
    let raw = vec![1.0, 2.0, 3.0, 4.0, 5.0, missing, missing, missing, missing, missing];
    let nan_marked: Vec<f32> = raw.iter().map(|&v| if v == missing { f32::NAN } else { v }).collect();

    let (dense, bitmap_bytes) = bitmap::contract(&nan_marked);
    assert_eq!(dense.len(), 5);

    let (param, payload) = grib2::packing::simple::pack(&dense, 1, 8).unwrap();
    let repr_values = [
        i64::from(param.ref_val.to_bits()),
        i64::from(param.binary_scale),
        i64::from(param.decimal_scale),
        i64::from(param.nbits),
        0,
    ];

    let mut asm = MessageAssembler::new();
    asm.create(0, &identification()).unwrap();
    asm.add_grid(0, &grid_values(10, 1), 10).unwrap();
    asm.add_field(&FieldSpec {
        prod_tmpl_num: 0,
        prod_values: &prod_values(0, 1),
        vertical_coords: &[],
        repr_tmpl_num: 0,
        repr_values: &repr_values,
        bitmap_indicator: 0,
        bitmap: Some(&bitmap_bytes),
        payload: &payload,
    })
    .unwrap();
    let bytes = asm.finalize().unwrap();

    let msg = grib2::Grib2Message::from_seekable(Cursor::new(bytes)).unwrap();
    let field = msg.extract_field(0, &FieldQuery::any()).unwrap();

    for i in 0..5 {
        assert!((field.values[i] - raw[i]).abs() < 1e-3);
    }
    for i in 5..10 {
        assert!(field.values[i].is_nan());
    }
}

/// Scenario 3: complex packing with second-order spatial differencing on an
/// arithmetic sequence collapses to a tiny payload (every second difference
/// is zero) and decodes back to the original sequence.
#[test]
fn complex_packing_with_second_order_differencing_round_trips() {
    let values: Vec<i64> = (0..1000i64).map(|i| 2 * i + 100).collect();
    let (first_values, minimum, normalized) = diff::apply(&values, diff::Order::Second);
    assert_eq!(first_values, vec![100, 102]);
    assert_eq!(minimum, 0);
    assert!(normalized.iter().all(|&d| d == 0));

    let groups = group::split_into_groups(&normalized, 1000);
    let group_bytes = group::pack(&groups, &normalized);
    let (ref_width, width_width, len_width) = group::descriptor_widths(&groups);

    let num_octets = 4usize;
    let mut payload = Vec::new();
    for &fv in &first_values {
        payload.extend(encode_signed_octets(fv, num_octets));
    }
    payload.extend(encode_signed_octets(minimum, num_octets));
    payload.extend(&group_bytes);
    assert!(payload.len() <= 200, "payload was {} bytes", payload.len());

    let repr_values: Vec<i64> = vec![
        0,                        // reference value R (IEEE-32 bits), unused: group refs carry the offset
        0,                        // binary scale factor E
        0,                        // decimal scale factor D
        i64::from(ref_width),     // bit width of the packed group reference values
        0,                        // type of original field values
        0,                        // group splitting method used
        0,                        // missing value management used
        0,                        // primary missing value substitute
        0,                        // secondary missing value substitute
        groups.len() as i64,      // NG, number of groups
        0,                        // reference for group widths
        i64::from(width_width),   // number of bits for group widths
        0,                        // reference for group lengths
        0,                        // length increment for group lengths
        0,                        // true length of last group
        i64::from(len_width),     // number of bits for group lengths
        2,                        // order of spatial differencing (second order)
        num_octets as i64,        // number of octets for extra descriptors
    ];

    let mut asm = MessageAssembler::new();
    asm.create(0, &identification()).unwrap();
    asm.add_grid(0, &grid_values(1000, 1), 1000).unwrap();
    asm.add_field(&FieldSpec {
        prod_tmpl_num: 0,
        prod_values: &prod_values(0, 1),
        vertical_coords: &[],
        repr_tmpl_num: 3,
        repr_values: &repr_values,
        bitmap_indicator: 255,
        bitmap: None,
        payload: &payload,
    })
    .unwrap();
    let bytes = asm.finalize().unwrap();

    let msg = grib2::Grib2Message::from_seekable(Cursor::new(bytes)).unwrap();
    let field = msg.extract_field(0, &FieldQuery::any()).unwrap();

    let recovered: Vec<i64> = field.values.iter().map(|&v| v.round() as i64).collect();
    assert_eq!(recovered, values);
}

fn simple_message(discipline: u8, category: i64, number: i64) -> Vec<u8> {
    let mut asm = MessageAssembler::new();
    asm.create(discipline, &identification()).unwrap();
    asm.add_grid(0, &grid_values(3, 2), 6).unwrap();
    asm.add_field_simple_packed(0, &prod_values(category, number), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 1, 8)
        .unwrap();
    asm.finalize().unwrap()
}

/// Scenario 4: indexing a file with three single-field messages of
/// disciplines `[0, 10, 0]`, a discipline-only search for `10` finds the
/// second message's field.
#[test]
fn index_search_finds_field_by_discipline() {
    let mut data = Vec::new();
    data.extend(simple_message(0, 0, 1));
    data.extend(simple_message(10, 0, 1));
    data.extend(simple_message(0, 0, 1));

    let buffer = grib2::scan_file("three_fields.grib2", &mut Cursor::new(data)).unwrap();
    assert_eq!(buffer.records.len(), 3);

    let query = FieldQuery { discipline: 10, ..FieldQuery::any() };
    let found = grib2::search(&buffer, &query).unwrap();
    assert_eq!(found.discipline, 10);
    assert_eq!(found.sequence_in_message, 0);
}

/// Scenario 5: `regenerate` forces a rescan so a later `get` reflects a
/// mutation made to the underlying file after it was first cached.
#[test]
fn cache_regenerate_picks_up_file_mutation() {
    use std::fs::File;
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("message.grib2");

    std::fs::write(&path, simple_message(3, 0, 1)).unwrap();

    let cache = IndexCache::new();
    let handle = FileHandle::try_from(5).unwrap();

    let first = cache
        .get::<File, _>(handle, "message.grib2", || File::open(&path))
        .unwrap();
    assert_eq!(first.records[0].discipline, 3);

    {
        let mut f = File::create(&path).unwrap();
        f.write_all(&simple_message(7, 0, 1)).unwrap();
    }

    let still_cached = cache
        .get::<File, _>(handle, "message.grib2", || File::open(&path))
        .unwrap();
    assert_eq!(still_cached.records[0].discipline, 3, "get alone must not notice the mutation");

    cache.regenerate(handle, "message.grib2", &mut File::open(&path).unwrap()).unwrap();

    let refreshed = cache
        .get::<File, _>(handle, "message.grib2", || File::open(&path))
        .unwrap();
    assert_eq!(refreshed.records[0].discipline, 7);
}

/// Scenario 6: a wildcarded query (`jpdt[0]` wildcarded, `jpdt[1] = 2`)
/// matches any field whose parameter number is 2, regardless of category.
#[test]
fn wildcarded_pdt_query_matches_by_parameter_number_only() {
    let mut data = Vec::new();
    data.extend(simple_message(0, 5, 2)); // category 5, number 2: should match
    data.extend(simple_message(0, 9, 9)); // number 9: should not match

    let buffer = grib2::scan_file("two_fields.grib2", &mut Cursor::new(data)).unwrap();
    assert_eq!(buffer.records.len(), 2);

    let query = FieldQuery { pdt_query: vec![WILDCARD, 2], ..FieldQuery::any() };
    let found = grib2::search(&buffer, &query).unwrap();
    assert_eq!(found.message_offset, buffer.records[0].message_offset);
}
