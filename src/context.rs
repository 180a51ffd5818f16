//! The in-memory message data model: the section table built by the reader,
//! and the submessage index that strings sections together into logical
//! fields.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::io::{Read, Seek};

use crate::error::{GribError, ParseError};
use crate::helpers::{grib_int_from_bytes, uint_from_bytes};
use crate::reader::{Grib2Read, SeekableGrib2Reader};
use crate::templates::{self, FieldWidth, Sign};

#[derive(Debug, Clone, PartialEq)]
pub struct SectionInfo {
    pub num: u8,
    pub offset: usize,
    pub size: usize,
    pub body: Option<SectionBody>,
}

impl SectionInfo {
    pub(crate) fn get_tmpl_num(&self) -> Option<u16> {
        match self.body.as_ref()? {
            SectionBody::Section3(s) => Some(s.grid_tmpl_num),
            SectionBody::Section4(s) => Some(s.prod_tmpl_num),
            SectionBody::Section5(s) => Some(s.repr_tmpl_num),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Section0(Indicator),
    Section1(Identification),
    Section2,
    Section3(GridDefinition),
    Section4(ProdDefinition),
    Section5(ReprDefinition),
    Section6(BitMap),
    /// Raw packed grid-point octets, decoded by [`crate::parser`] once the
    /// representation template (Section 5) says how to interpret them.
    Section7(Box<[u8]>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Indicator {
    /// GRIB Master Table Number (Code Table 0.0).
    pub discipline: u8,
    /// Total length of the GRIB2 message in octets, including Section 0.
    pub total_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub centre_id: u16,
    pub subcentre_id: u16,
    pub master_table_version: u8,
    pub local_table_version: u8,
    pub ref_time_significance: u8,
    pub ref_time: DateTime<Utc>,
    pub prod_status: u8,
    pub data_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridDefinition {
    pub num_points: u32,
    pub grid_tmpl_num: u16,
    pub(crate) fields: Box<[i64]>,
    pub(crate) template_supported: bool,
}

impl GridDefinition {
    /// Decoded Grid Definition Template field values, in declaration order.
    /// Empty when `grid_tmpl_num` has no registry entry.
    pub fn fields(&self) -> &[i64] {
        &self.fields
    }
}

/// A decoded template's fields, one `i64` per field in declaration order
/// (including any extension groups appended after the static prefix).
#[derive(Debug, Clone, PartialEq)]
pub struct ProdDefinition {
    pub num_coordinates: u16,
    pub prod_tmpl_num: u16,
    pub(crate) fields: Box<[i64]>,
    pub(crate) template_supported: bool,
    /// Optional vertical coordinate list trailing the template values
    /// (hybrid/sigma level definitions), one IEEE-32 float per declared
    /// coordinate.
    pub vertical_coords: Box<[f32]>,
}

impl ProdDefinition {
    /// Decoded Product Definition Template field values, in declaration
    /// order. Empty when `prod_tmpl_num` has no registry entry.
    pub fn fields(&self) -> &[i64] {
        &self.fields
    }

    pub fn parameter_category(&self) -> Option<u8> {
        self.field(0)
    }

    pub fn parameter_number(&self) -> Option<u8> {
        self.field(1)
    }

    /// Analysis/forecast generating process identifier, PDT 4.0/4.8 field 4.
    pub fn generating_process(&self) -> Option<u8> {
        self.field(4)
    }

    /// `(unit, forecast time)`, PDT 4.0/4.8 fields 7 and 8.
    pub fn forecast_time(&self) -> Option<(u8, i64)> {
        let unit = self.field::<u8>(7)?;
        let time = *self.fields.get(8)?;
        Some((unit, time))
    }

    fn field<T: TryFrom<i64>>(&self, index: usize) -> Option<T> {
        if !self.template_supported {
            return None;
        }
        T::try_from(*self.fields.get(index)?).ok()
    }
}

/// Decodes a section's template octets, returning the decoded fields, a
/// `template_supported` flag, and the number of octets of `raw` the template
/// consumed (the remainder, if any, is the section's trailing payload, e.g.
/// Section 4's vertical coordinate list).
pub(crate) fn decode_template_fields(
    section: u8,
    template_num: u16,
    raw: &[u8],
) -> Result<(Box<[i64]>, bool, usize), GribError> {
    let layout = match templates::lookup(section, template_num) {
        Ok(l) => l,
        Err(_) => return Ok((Box::new([]), false, 0)),
    };

    let mut fields = decode_fields(raw, 0, layout.widths)?;
    let mut offset: usize = layout.widths.iter().map(|w| w.octets() as usize).sum();

    let extra_widths = templates::resolve_extension(&layout, &fields);
    if !extra_widths.is_empty() {
        let extra = decode_fields(raw, offset, &extra_widths)?;
        offset += extra_widths.iter().map(|w| w.octets() as usize).sum::<usize>();
        fields.extend(extra);
    }

    Ok((fields.into_boxed_slice(), true, offset))
}

fn decode_fields(raw: &[u8], start: usize, widths: &[FieldWidth]) -> Result<Vec<i64>, GribError> {
    let mut fields = Vec::with_capacity(widths.len());
    let mut offset = start;
    for width in widths {
        let len = width.octets() as usize;
        let end = offset + len;
        let chunk = raw
            .get(offset..end)
            .ok_or(GribError::ParseError(ParseError::UnexpectedEndOfData))?;
        let value = match width.sign() {
            Sign::Signed => i64::from(grib_int_from_bytes(chunk)),
            Sign::Unsigned => i64::from(uint_from_bytes(chunk)),
        };
        fields.push(value);
        offset = end;
    }
    Ok(fields)
}

/// Inverse of [`decode_template_fields`]: encodes `values` (static prefix
/// plus any already-expanded extension groups) into wire octets using the
/// registry's field widths, used by [`crate::assembler`] when writing
/// Sections 3, 4, and 5.
pub(crate) fn encode_template_fields(
    section: u8,
    template_num: u16,
    values: &[i64],
) -> Result<Vec<u8>, templates::TemplateError> {
    let layout = templates::lookup(section, template_num)?;
    let mut widths = layout.widths.to_vec();
    widths.extend(templates::resolve_extension(&layout, values));

    let mut bytes = Vec::with_capacity(widths.iter().map(|w| w.octets() as usize).sum());
    for (width, &value) in widths.iter().zip(values.iter()) {
        let len = width.octets() as usize;
        match width.sign() {
            Sign::Signed => bytes.extend(crate::helpers::grib_int_to_bytes(value as i32, len)),
            Sign::Unsigned => bytes.extend(crate::helpers::uint_to_bytes(value as u32, len)),
        }
    }
    Ok(bytes)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReprDefinition {
    /// Number of points carrying an actual value: all grid points when no
    /// bitmap is present, only the unmasked ones when one is.
    pub num_points: u32,
    pub repr_tmpl_num: u16,
    pub(crate) fields: Box<[i64]>,
    pub(crate) template_supported: bool,
}

impl ReprDefinition {
    /// Decoded Data Representation Template field values, in declaration
    /// order. Empty when `repr_tmpl_num` has no registry entry.
    pub fn fields(&self) -> &[i64] {
        &self.fields
    }

    pub fn template_supported(&self) -> bool {
        self.template_supported
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitMap {
    pub bitmap_indicator: u8,
    /// Raw bitmap octets, one bit per grid point, MSB-first. Only present
    /// when `bitmap_indicator == 0`; empty for predefined (1..=253),
    /// reused (254), or absent (255) bitmaps.
    pub bitmap_bytes: Box<[u8]>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SubMessageIndex {
    section2: Option<usize>,
    section3: usize,
    section4: usize,
    section5: usize,
    section6: usize,
    section7: usize,
}

pub struct Grib2<R> {
    reader: RefCell<R>,
    sections: Box<[SectionInfo]>,
    submessages: Box<[SubMessageIndex]>,
}

impl<R: Grib2Read> Grib2<R> {
    pub fn read(mut r: R) -> Result<Self, GribError> {
        let sects = r.scan()?;
        let submessages = index_submessages(&sects)?;
        Ok(Self {
            reader: RefCell::new(r),
            sections: sects,
            submessages,
        })
    }

    pub fn info(&self) -> Result<(&Indicator, &Identification), GribError> {
        match (self.sections.first(), self.sections.get(1)) {
            (
                Some(SectionInfo {
                    body: Some(SectionBody::Section0(ind)),
                    ..
                }),
                Some(SectionInfo {
                    body: Some(SectionBody::Section1(id)),
                    ..
                }),
            ) => Ok((ind, id)),
            _ => Err(GribError::InternalDataError),
        }
    }

    pub fn submessages(&self) -> SubMessageIterator<'_> {
        SubMessageIterator::new(&self.submessages, &self.sections)
    }

    pub fn sections(&self) -> &[SectionInfo] {
        &self.sections
    }

    pub fn reader(&self) -> &RefCell<R> {
        &self.reader
    }
}

impl<R: Read + Seek> Grib2<SeekableGrib2Reader<R>> {
    pub fn read_with_seekable(r: R) -> Result<Self, GribError> {
        Grib2::read(SeekableGrib2Reader::new(r))
    }
}

/// Validates the section order and groups sections into submessages,
/// mirroring the assembler's state machine run in reverse.
fn index_submessages(sects: &[SectionInfo]) -> Result<Box<[SubMessageIndex]>, ParseError> {
    let mut iter = sects.iter().enumerate();
    let mut starts = Vec::new();
    let mut i2_default = None;
    let mut i3_default = None;

    macro_rules! check {
        ($num:expr) => {{
            let (i, sect) = iter.next().ok_or(ParseError::UnexpectedEndOfData)?;
            if sect.num != $num {
                return Err(ParseError::InvalidSectionOrder(i));
            }
            i
        }};
    }

    macro_rules! update_default {
        ($submessage:expr) => {{
            let submessage = $submessage;
            i2_default = submessage.section2;
            i3_default = Some(submessage.section3);
            submessage
        }};
    }

    check!(0);
    check!(1);

    loop {
        let sect = iter.next();
        let start = match sect {
            Some((i, SectionInfo { num: 2, .. })) => {
                let i3 = check!(3);
                let i4 = check!(4);
                let i5 = check!(5);
                let i6 = check!(6);
                let i7 = check!(7);
                update_default!(SubMessageIndex {
                    section2: Some(i),
                    section3: i3,
                    section4: i4,
                    section5: i5,
                    section6: i6,
                    section7: i7,
                })
            }
            Some((i, SectionInfo { num: 3, .. })) => {
                let i4 = check!(4);
                let i5 = check!(5);
                let i6 = check!(6);
                let i7 = check!(7);
                update_default!(SubMessageIndex {
                    section2: i2_default,
                    section3: i,
                    section4: i4,
                    section5: i5,
                    section6: i6,
                    section7: i7,
                })
            }
            Some((i, SectionInfo { num: 4, .. })) => {
                let i3 = i3_default.ok_or(ParseError::NoGridDefinition(i))?;
                let i5 = check!(5);
                let i6 = check!(6);
                let i7 = check!(7);
                update_default!(SubMessageIndex {
                    section2: i2_default,
                    section3: i3,
                    section4: i,
                    section5: i5,
                    section6: i6,
                    section7: i7,
                })
            }
            Some((i, SectionInfo { num: 8, .. })) => {
                if i3_default.is_none() {
                    return Err(ParseError::NoGridDefinition(i));
                }
                if i < sects.len() - 1 {
                    return Err(ParseError::InvalidSectionOrder(i));
                }
                break;
            }
            Some((i, SectionInfo { .. })) => {
                return Err(ParseError::InvalidSectionOrder(i));
            }
            None => return Err(ParseError::UnexpectedEndOfData),
        };
        starts.push(start);
    }

    Ok(starts.into_boxed_slice())
}

#[derive(Clone)]
pub struct SubMessageIterator<'a> {
    indices: &'a [SubMessageIndex],
    sections: &'a [SectionInfo],
    pos: usize,
}

impl<'a> SubMessageIterator<'a> {
    fn new(indices: &'a [SubMessageIndex], sections: &'a [SectionInfo]) -> Self {
        Self {
            indices,
            sections,
            pos: 0,
        }
    }

    fn section(&self, index: usize) -> Option<SubMessageSection<'a>> {
        Some(SubMessageSection::new(index, self.sections.get(index)?))
    }
}

impl<'a> Iterator for SubMessageIterator<'a> {
    type Item = SubMessage<'a>;

    fn next(&mut self) -> Option<SubMessage<'a>> {
        let idx = self.indices.get(self.pos)?;
        self.pos += 1;
        Some(SubMessage {
            section0: self.section(0)?,
            section1: self.section(1)?,
            section2: idx.section2.and_then(|i| self.section(i)),
            section3: self.section(idx.section3)?,
            section4: self.section(idx.section4)?,
            section5: self.section(idx.section5)?,
            section6: self.section(idx.section6)?,
            section7: self.section(idx.section7)?,
            section8: self.section(self.sections.len() - 1)?,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = self.indices.len() - self.pos;
        (size, Some(size))
    }
}

pub struct SubMessage<'a> {
    pub section0: SubMessageSection<'a>,
    pub section1: SubMessageSection<'a>,
    pub section2: Option<SubMessageSection<'a>>,
    pub section3: SubMessageSection<'a>,
    pub section4: SubMessageSection<'a>,
    pub section5: SubMessageSection<'a>,
    pub section6: SubMessageSection<'a>,
    pub section7: SubMessageSection<'a>,
    pub section8: SubMessageSection<'a>,
}

impl<'a> SubMessage<'a> {
    pub fn indicator(&self) -> &Indicator {
        match self.section0.body.body.as_ref().unwrap() {
            SectionBody::Section0(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn prod_def(&self) -> &ProdDefinition {
        match self.section4.body.body.as_ref().unwrap() {
            SectionBody::Section4(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn identification(&self) -> &Identification {
        match self.section1.body.body.as_ref().unwrap() {
            SectionBody::Section1(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn grid_def(&self) -> &GridDefinition {
        match self.section3.body.body.as_ref().unwrap() {
            SectionBody::Section3(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn repr_def(&self) -> &ReprDefinition {
        match self.section5.body.body.as_ref().unwrap() {
            SectionBody::Section5(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn bitmap_def(&self) -> &BitMap {
        match self.section6.body.body.as_ref().unwrap() {
            SectionBody::Section6(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self.section7.body.body.as_ref().unwrap() {
            SectionBody::Section7(data) => data,
            _ => panic!("something unexpected happened"),
        }
    }
}

pub struct SubMessageSection<'a> {
    pub index: usize,
    pub body: &'a SectionInfo,
}

impl<'a> SubMessageSection<'a> {
    pub fn new(index: usize, body: &'a SectionInfo) -> Self {
        Self { index, body }
    }

    pub fn template_num(&self) -> Option<u16> {
        self.body.get_tmpl_num()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! sect_list {
        ($($num:expr,)*) => {{
            vec![
                $(SectionInfo { num: $num, offset: 0, size: 0, body: None },)*
            ].into_boxed_slice()
        }}
    }

    #[test]
    fn index_submessages_simple() {
        let sects = sect_list![0, 1, 2, 3, 4, 5, 6, 7, 8,];
        let result = index_submessages(&sects).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn index_submessages_repeated_section4_reuses_grid() {
        let sects = sect_list![0, 1, 3, 4, 5, 6, 7, 4, 5, 6, 7, 8,];
        let result = index_submessages(&sects).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].section3, result[1].section3);
    }

    #[test]
    fn index_submessages_rejects_missing_grid_definition() {
        let sects = sect_list![0, 1, 4, 5, 6, 7, 8,];
        let err = index_submessages(&sects).unwrap_err();
        assert_eq!(err, ParseError::NoGridDefinition(2));
    }

    #[test]
    fn index_submessages_rejects_out_of_order_sections() {
        let sects = sect_list![0, 1, 3, 5, 4, 6, 7, 8,];
        let err = index_submessages(&sects).unwrap_err();
        assert_eq!(err, ParseError::InvalidSectionOrder(3));
    }

    #[test]
    fn decode_template_fields_reads_pdt_4_0() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&[1, 2, 0, 0, 5]); // category, number, gen type, bg id, fc id
        raw.extend_from_slice(&[0, 0]); // cutoff hours
        raw.push(0); // cutoff minutes
        raw.push(1); // time unit
        raw.extend_from_slice(&6u32.to_be_bytes()); // forecast time
        raw.push(1); // first surface type
        raw.push(0); // first surface scale
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.push(255); // second surface type (missing)
        raw.push(0);
        raw.extend_from_slice(&0u32.to_be_bytes());

        let (fields, supported, consumed) = decode_template_fields(4, 0, &raw).unwrap();
        assert!(supported);
        assert_eq!(consumed, raw.len());
        let prod = ProdDefinition {
            num_coordinates: 0,
            prod_tmpl_num: 0,
            fields,
            template_supported: supported,
            vertical_coords: Box::new([]),
        };
        assert_eq!(prod.parameter_category(), Some(1));
        assert_eq!(prod.parameter_number(), Some(2));
        assert_eq!(prod.generating_process(), Some(5));
        assert_eq!(prod.forecast_time(), Some((1, 6)));
    }
}
