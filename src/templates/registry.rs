use super::TemplateError;

/// Sign convention for a template field: `signed` fields use a leading sign
/// bit followed by the magnitude; `unsigned` fields use the full width as
/// magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Unsigned,
    Signed,
}

/// A single template field: its declared octet width (`1..=4`) and sign
/// convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldWidth {
    Fixed(u8, Sign),
}

impl FieldWidth {
    pub fn octets(&self) -> u8 {
        let Self::Fixed(w, _) = self;
        *w
    }

    pub fn sign(&self) -> Sign {
        let Self::Fixed(_, s) = self;
        *s
    }
}

const fn u(w: u8) -> FieldWidth {
    FieldWidth::Fixed(w, Sign::Unsigned)
}

const fn s(w: u8) -> FieldWidth {
    FieldWidth::Fixed(w, Sign::Signed)
}

/// Names the closed set of ways a template's field list can grow depending
/// on already-decoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionRule {
    /// Product Definition Templates describing a statistically processed
    /// field over `n` time ranges (e.g. PDT 4.8): the static prefix ends
    /// with the count `n`, followed by `n` repeating 12-octet groups.
    ProductDefinitionTimeRanges { count_field_index: usize, group_widths: &'static [FieldWidth] },
}

/// The field-width list (and, if any, extension rule) for one template
/// number within one section.
#[derive(Debug, Clone, Copy)]
pub struct TemplateLayout {
    pub widths: &'static [FieldWidth],
    pub extension: Option<ExtensionRule>,
}

// Grid Definition Template 3.0: Latitude/Longitude (regular lat/lon grid).
static GDT_3_0: &[FieldWidth] = &[
    u(1), // shape of the earth
    u(1), // scale factor of radius of spherical earth
    u(4), // scaled value of radius of spherical earth
    u(1), // scale factor of major axis of oblate spheroid earth
    u(4), // scaled value of major axis
    u(1), // scale factor of minor axis of oblate spheroid earth
    u(4), // scaled value of minor axis
    u(4), // Ni, number of points along a parallel
    u(4), // Nj, number of points along a meridian
    u(4), // basic angle of the initial production domain
    u(4), // subdivisions of basic angle
    s(4), // La1, latitude of first grid point
    s(4), // Lo1, longitude of first grid point
    u(1), // resolution and component flags
    s(4), // La2, latitude of last grid point
    s(4), // Lo2, longitude of last grid point
    u(4), // Di, i-direction increment
    u(4), // Dj, j-direction increment
    u(1), // scanning mode
];

// Grid Definition Template 3.50: spherical harmonic coefficients, read by
// the spectral packer (C7) for the (J, K, M) triangular truncation.
static GDT_3_50: &[FieldWidth] = &[
    u(4), // J, number of parameters
    u(4), // K, number of parameters
    u(4), // M, number of parameters
    u(1), // spectral data representation type
];

// Product Definition Template 4.0: analysis/forecast at a point in time.
static PDT_4_0: &[FieldWidth] = &[
    u(1), // parameter category
    u(1), // parameter number
    u(1), // type of generating process
    u(1), // background generating process identifier
    u(1), // analysis/forecast generating process identifier
    u(2), // hours after reference time of data cutoff
    u(1), // minutes after reference time of data cutoff
    u(1), // indicator of unit of time range
    s(4), // forecast time
    u(1), // type of first fixed surface
    s(1), // scale factor of first fixed surface
    s(4), // scaled value of first fixed surface
    u(1), // type of second fixed surface
    s(1), // scale factor of second fixed surface
    s(4), // scaled value of second fixed surface
];

// Repeating group appended once per time range by PDT 4.8.
static PDT_4_8_TIME_RANGE_GROUP: &[FieldWidth] = &[
    u(1), // type of statistical processing
    u(1), // type of time increment
    u(1), // indicator of unit for time range
    u(4), // length of the time range
    u(1), // indicator of unit for time increment
    u(4), // time increment
];

// Product Definition Template 4.8: average/accumulation/extreme over a time
// interval. Static prefix is PDT 4.0 plus the end-of-interval date/time and
// the time-range-group count `n`.
static PDT_4_8_PREFIX: &[FieldWidth] = &[
    u(1), u(1), u(1), u(1), u(1), u(2), u(1), u(1), s(4), u(1), s(1), s(4), u(1), s(1), s(4), // PDT 4.0 fields
    u(2), // year of end of overall time interval
    u(1), // month
    u(1), // day
    u(1), // hour
    u(1), // minute
    u(1), // second
    u(1), // n, number of time range specifications
    u(4), // total number of data values missing from averages/accumulations
];

// Data Representation Template 5.0: grid point data, simple packing.
static DRT_5_0: &[FieldWidth] = &[
    u(4), // reference value R (IEEE-32 bit pattern)
    s(2), // binary scale factor E
    s(2), // decimal scale factor D
    u(1), // number of bits B
    u(1), // type of original field values
];

// Data Representation Template 5.2: complex packing.
static DRT_5_2: &[FieldWidth] = &[
    u(4), s(2), s(2), u(1), u(1), // DRT 5.0 fields
    u(1), // group splitting method used
    u(1), // missing value management used
    u(4), // primary missing value substitute
    u(4), // secondary missing value substitute
    u(4), // NG, number of groups
    u(1), // reference for group widths
    u(1), // number of bits for group widths
    u(4), // reference for group lengths
    u(1), // length increment for group lengths
    u(4), // true length of last group
    u(1), // number of bits for group lengths
];

// Data Representation Template 5.3: complex packing with spatial differencing.
static DRT_5_3: &[FieldWidth] = &[
    u(4), s(2), s(2), u(1), u(1),
    u(1), u(1), u(4), u(4), u(4), u(1), u(1), u(4), u(1), u(4), u(1), // DRT 5.2 fields
    u(1), // order of spatial differencing
    u(1), // number of octets for extra descriptors
];

// Data Representation Template 5.40: JPEG 2000 code stream.
static DRT_5_40: &[FieldWidth] = &[
    u(4), s(2), s(2), u(1), u(1), // DRT 5.0 fields
    u(1), // type of compression
    u(1), // target compression ratio
];

// Data Representation Template 5.41: Portable Network Graphics (PNG).
static DRT_5_41: &[FieldWidth] = &[
    u(4), s(2), s(2), u(1), u(1), // DRT 5.0 fields, no further fields
];

// Data Representation Template 5.50: spherical harmonic data, simple
// packing. Every coefficient, including (0, 0), is packed together, so
// unlike 5.51 there is no separately stored leading value.
static DRT_5_50: &[FieldWidth] = &[
    u(4), // reference value R (IEEE-32 bit pattern)
    s(2), // binary scale factor E
    s(2), // decimal scale factor D
    u(1), // number of bits B
];

// Data Representation Template 5.51: spherical harmonic data, complex
// packing. The (0,0) coefficient replaces the usual reference value R,
// stored verbatim instead of being folded into the simple-packing formula.
// Triangular truncation (J, K, M) lives in the paired Grid Definition
// Template 3.50, not here.
static DRT_5_51: &[FieldWidth] = &[
    u(4), // real part of (0, 0) coefficient (IEEE-32 bit pattern)
    s(2), // binary scale factor E
    s(2), // decimal scale factor D
    u(1), // number of bits B
];

/// Looks up the field-width list for `template_num` within `section`
/// (3, 4, or 5). Unknown numbers return [`TemplateError::Unsupported`]
/// rather than panicking.
pub fn lookup(section: u8, template_num: u16) -> Result<TemplateLayout, TemplateError> {
    let widths = match (section, template_num) {
        (3, 0) => GDT_3_0,
        (3, 50) => GDT_3_50,
        (4, 0) => PDT_4_0,
        (4, 8) => PDT_4_8_PREFIX,
        (5, 0) => DRT_5_0,
        (5, 2) => DRT_5_2,
        (5, 3) => DRT_5_3,
        (5, 40) => DRT_5_40,
        (5, 41) => DRT_5_41,
        (5, 50) => DRT_5_50,
        (5, 51) => DRT_5_51,
        _ => {
            return Err(TemplateError::Unsupported {
                section,
                template_num,
            })
        }
    };

    let extension = match (section, template_num) {
        (4, 8) => Some(ExtensionRule::ProductDefinitionTimeRanges {
            count_field_index: 21,
            group_widths: PDT_4_8_TIME_RANGE_GROUP,
        }),
        _ => None,
    };

    Ok(TemplateLayout { widths, extension })
}

/// Resolves a template's extension rule given the already-decoded static
/// prefix, returning the field-width list that follows it.
pub fn resolve_extension(layout: &TemplateLayout, decoded_prefix: &[i64]) -> Vec<FieldWidth> {
    match layout.extension {
        None => Vec::new(),
        Some(ExtensionRule::ProductDefinitionTimeRanges {
            count_field_index,
            group_widths,
        }) => {
            let n = decoded_prefix
                .get(count_field_index)
                .copied()
                .unwrap_or(0)
                .max(0) as usize;
            let mut widths = Vec::with_capacity(n * group_widths.len());
            for _ in 0..n {
                widths.extend_from_slice(group_widths);
            }
            widths
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_templates_succeeds() {
        for (section, num) in [(3, 0), (3, 50), (4, 0), (4, 8), (5, 0), (5, 2), (5, 3), (5, 40), (5, 41), (5, 50), (5, 51)] {
            assert!(lookup(section, num).is_ok());
        }
    }

    #[test]
    fn lookup_unknown_template_is_typed_error() {
        let err = lookup(4, 253).unwrap_err();
        assert_eq!(
            err,
            TemplateError::Unsupported {
                section: 4,
                template_num: 253
            }
        );
    }

    #[test]
    fn pdt_4_8_extension_expands_to_n_groups() {
        let layout = lookup(4, 8).unwrap();
        let mut prefix = vec![0i64; layout.widths.len()];
        prefix[21] = 3; // n = 3 time ranges
        let extra = resolve_extension(&layout, &prefix);
        assert_eq!(extra.len(), 3 * PDT_4_8_TIME_RANGE_GROUP.len());
    }
}
