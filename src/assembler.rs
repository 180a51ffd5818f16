//! Incremental message assembly (C8): builds Sections 0-8 into a growing
//! byte buffer, using the same section-ordering discipline as the reader's
//! scan but read backwards. Where the reader *checks* a state machine of
//! what section can follow what, the assembler *drives* the same machine
//! forward while writing.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::context::encode_template_fields;
use crate::ieee754::f32_to_bits;
use crate::packing::{self, PackingError, SimplePackingParam};
use crate::templates::TemplateError;

/// Grid Definition Template number used for spherical harmonic coefficient
/// grids (WMO Code Table 3.1 entry 50). Not carried in the template
/// registry (C3 only ships Template 3.0), but the assembler still needs to
/// recognize it to enforce the DRT-5.50/5.51 pairing rule.
const SPHERICAL_HARMONIC_GDT: u16 = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblerError {
    NotInitialized,
    AlreadyComplete,
    InternalLengthMismatch,
    BadPredecessorSection,
    MissingGridDefinition,
    UnsupportedTemplate(TemplateError),
    MissingPriorBitmap,
    SphericalHarmonicGDTRequired,
    PackingFailed(PackingError),
}

impl Error for AssemblerError {}

impl Display for AssemblerError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "create() must be called before any other operation"),
            Self::AlreadyComplete => write!(f, "message is already finalized"),
            Self::InternalLengthMismatch => write!(f, "tracked section lengths do not match the buffer length"),
            Self::BadPredecessorSection => write!(f, "operation is not valid in the current assembly state"),
            Self::MissingGridDefinition => write!(f, "add_grid() must be called before add_field()"),
            Self::UnsupportedTemplate(e) => write!(f, "{e}"),
            Self::MissingPriorBitmap => write!(f, "no prior bitmap is available to reuse or reference"),
            Self::SphericalHarmonicGDTRequired => write!(
                f,
                "DRT 5.50/5.51 requires a spherical harmonic grid definition (GDT 3.50)"
            ),
            Self::PackingFailed(e) => write!(f, "{e}"),
        }
    }
}

impl From<TemplateError> for AssemblerError {
    fn from(e: TemplateError) -> Self {
        Self::UnsupportedTemplate(e)
    }
}

impl From<PackingError> for AssemblerError {
    fn from(e: PackingError) -> Self {
        Self::PackingFailed(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssemblerState {
    Empty,
    Created,
    LocalUseWritten,
    GridWritten,
    FieldWritten,
    Complete,
}

/// Identification values written into Section 1 by [`MessageAssembler::create`].
#[derive(Debug, Clone, Copy)]
pub struct IdentificationSpec {
    pub centre_id: u16,
    pub subcentre_id: u16,
    pub master_table_version: u8,
    pub local_table_version: u8,
    pub ref_time_significance: u8,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub prod_status: u8,
    pub data_type: u8,
}

/// Parameters for one call to [`MessageAssembler::add_field`]. Section 5's
/// simple-packing parameters are already baked into `repr_values` (field 0
/// is the IEEE-32 bit pattern of the reference value, fields 1-3 the binary
/// scale, decimal scale, and bit count), the same way a caller that used
/// `packing::simple::pack` would lay them out.
pub struct FieldSpec<'a> {
    pub prod_tmpl_num: u16,
    pub prod_values: &'a [i64],
    pub vertical_coords: &'a [f32],
    pub repr_tmpl_num: u16,
    pub repr_values: &'a [i64],
    /// `0`/`1..=253` write a bitmap body (the predefined-table indices 1-253
    /// carry no bytes of our own; only 0 does); `254` reuses the most
    /// recently defined bitmap; `255` means no bitmap at all.
    pub bitmap_indicator: u8,
    pub bitmap: Option<&'a [u8]>,
    pub payload: &'a [u8],
}

/// Incrementally builds a GRIB2 message octet buffer, enforcing a state
/// table of legal section orderings.
pub struct MessageAssembler {
    buf: Vec<u8>,
    state: AssemblerState,
    section_lengths: Vec<usize>,
    grid_tmpl_num: Option<u16>,
    num_points: u32,
    bitmap_is_defined: bool,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            state: AssemblerState::Empty,
            section_lengths: Vec::new(),
            grid_tmpl_num: None,
            num_points: 0,
            bitmap_is_defined: false,
        }
    }

    fn require(&self, valid: &[AssemblerState]) -> Result<(), AssemblerError> {
        if self.state == AssemblerState::Complete {
            return Err(AssemblerError::AlreadyComplete);
        }
        if self.state == AssemblerState::Empty && !valid.contains(&AssemblerState::Empty) {
            return Err(AssemblerError::NotInitialized);
        }
        if !valid.contains(&self.state) {
            return Err(AssemblerError::BadPredecessorSection);
        }
        Ok(())
    }

    fn push_section(&mut self, num: u8, body: Vec<u8>) {
        let len = 5 + body.len();
        self.buf.extend_from_slice(&(len as u32).to_be_bytes());
        self.buf.push(num);
        self.buf.extend_from_slice(&body);
        self.section_lengths.push(len);
        self.rewrite_total_length();
    }

    fn rewrite_total_length(&mut self) {
        let len = self.buf.len() as u64;
        self.buf[8..16].copy_from_slice(&len.to_be_bytes());
    }

    /// Writes Section 0 and Section 1, entering state S0/S1.
    pub fn create(&mut self, discipline: u8, id: &IdentificationSpec) -> Result<(), AssemblerError> {
        self.require(&[AssemblerState::Empty])?;

        self.buf.extend_from_slice(b"GRIB");
        self.buf.extend_from_slice(&[0, 0]); // reserved
        self.buf.push(discipline);
        self.buf.push(2); // edition
        self.buf.extend_from_slice(&0u64.to_be_bytes()); // length placeholder
        debug_assert_eq!(self.buf.len(), 16);

        let mut sect1 = Vec::with_capacity(16);
        sect1.extend_from_slice(&id.centre_id.to_be_bytes());
        sect1.extend_from_slice(&id.subcentre_id.to_be_bytes());
        sect1.push(id.master_table_version);
        sect1.push(id.local_table_version);
        sect1.push(id.ref_time_significance);
        sect1.extend_from_slice(&id.year.to_be_bytes());
        sect1.push(id.month);
        sect1.push(id.day);
        sect1.push(id.hour);
        sect1.push(id.minute);
        sect1.push(id.second);
        sect1.push(id.prod_status);
        sect1.push(id.data_type);
        self.push_section(1, sect1);

        self.state = AssemblerState::Created;
        Ok(())
    }

    /// Writes Section 2 (local use), entering state S2.
    pub fn add_local_use(&mut self, bytes: &[u8]) -> Result<(), AssemblerError> {
        self.require(&[AssemblerState::Created])?;
        self.push_section(2, bytes.to_vec());
        self.state = AssemblerState::LocalUseWritten;
        Ok(())
    }

    /// Writes Section 3 (grid definition), entering state S3.
    pub fn add_grid(&mut self, template_num: u16, values: &[i64], num_points: u32) -> Result<(), AssemblerError> {
        self.require(&[AssemblerState::Created, AssemblerState::LocalUseWritten])?;

        let template_bytes = encode_template_fields(3, template_num, values)?;
        let mut body = Vec::with_capacity(9 + template_bytes.len());
        body.push(0); // source of grid definition
        body.extend_from_slice(&num_points.to_be_bytes());
        body.push(0); // number of octets for optional list
        body.push(0); // interpretation of optional list
        body.extend_from_slice(&template_num.to_be_bytes());
        body.extend_from_slice(&template_bytes);
        self.push_section(3, body);

        self.grid_tmpl_num = Some(template_num);
        self.num_points = num_points;
        self.state = AssemblerState::GridWritten;
        Ok(())
    }

    /// Writes Sections 4, 5, 6, and 7 atomically, entering (or remaining in)
    /// state S7.
    pub fn add_field(&mut self, field: &FieldSpec) -> Result<(), AssemblerError> {
        self.require(&[AssemblerState::GridWritten, AssemblerState::FieldWritten])?;
        let grid_tmpl_num = self.grid_tmpl_num.ok_or(AssemblerError::MissingGridDefinition)?;

        if matches!(field.repr_tmpl_num, 50 | 51) && grid_tmpl_num != SPHERICAL_HARMONIC_GDT {
            return Err(AssemblerError::SphericalHarmonicGDTRequired);
        }

        // Section 4.
        let pdt_bytes = encode_template_fields(4, field.prod_tmpl_num, field.prod_values)?;
        let mut sect4 = Vec::with_capacity(4 + pdt_bytes.len() + field.vertical_coords.len() * 4);
        sect4.extend_from_slice(&(field.vertical_coords.len() as u16).to_be_bytes());
        sect4.extend_from_slice(&field.prod_tmpl_num.to_be_bytes());
        sect4.extend_from_slice(&pdt_bytes);
        for &coord in field.vertical_coords {
            sect4.extend_from_slice(&f32_to_bits(coord).to_be_bytes());
        }
        self.push_section(4, sect4);

        // Section 5.
        let drt_bytes = encode_template_fields(5, field.repr_tmpl_num, field.repr_values)?;
        let mut sect5 = Vec::with_capacity(6 + drt_bytes.len());
        sect5.extend_from_slice(&self.packed_point_count(field).to_be_bytes());
        sect5.extend_from_slice(&field.repr_tmpl_num.to_be_bytes());
        sect5.extend_from_slice(&drt_bytes);
        self.push_section(5, sect5);

        // Section 6.
        match field.bitmap_indicator {
            0 => {
                let bitmap = field.bitmap.ok_or(AssemblerError::MissingPriorBitmap)?;
                let mut sect6 = Vec::with_capacity(1 + bitmap.len());
                sect6.push(0);
                sect6.extend_from_slice(bitmap);
                self.push_section(6, sect6);
                self.bitmap_is_defined = true;
            }
            254 => {
                if !self.bitmap_is_defined {
                    return Err(AssemblerError::MissingPriorBitmap);
                }
                self.push_section(6, vec![254]);
            }
            indicator => {
                self.push_section(6, vec![indicator]);
                if indicator != 255 {
                    self.bitmap_is_defined = true;
                }
            }
        }

        // Section 7.
        self.push_section(7, field.payload.to_vec());

        self.state = AssemblerState::FieldWritten;
        Ok(())
    }

    /// Convenience wrapper around [`add_field`](Self::add_field) that simple-packs
    /// `values` itself, surfacing packing failures as
    /// [`AssemblerError::PackingFailed`].
    pub fn add_field_simple_packed(
        &mut self,
        prod_tmpl_num: u16,
        prod_values: &[i64],
        values: &[f32],
        decimal_scale: i16,
        nbits: u8,
    ) -> Result<(), AssemblerError> {
        let (param, payload) = packing::simple::pack(values, decimal_scale, nbits)?;
        let repr_values = simple_packing_param_to_fields(&param);
        self.add_field(&FieldSpec {
            prod_tmpl_num,
            prod_values,
            vertical_coords: &[],
            repr_tmpl_num: 0,
            repr_values: &repr_values,
            bitmap_indicator: 255,
            bitmap: None,
            payload: &payload,
        })
    }

    /// Appends the End Section and returns the finished message buffer.
    pub fn finalize(&mut self) -> Result<Vec<u8>, AssemblerError> {
        self.require(&[AssemblerState::FieldWritten])?;

        let expected: usize = 16 + self.section_lengths.iter().sum::<usize>();
        if expected != self.buf.len() {
            return Err(AssemblerError::InternalLengthMismatch);
        }

        self.buf.extend_from_slice(b"7777");
        self.rewrite_total_length();
        self.state = AssemblerState::Complete;
        Ok(std::mem::take(&mut self.buf))
    }
}

impl MessageAssembler {
    /// Number of data points the packer actually sees: the bitmap's popcount
    /// when a fresh one is supplied (indicator 0), or the full grid point
    /// count otherwise. A reused bitmap (254)'s popcount isn't retained, so
    /// decoders recompute it from the reused Section 6 bytes at read time
    /// rather than trusting Section 5.
    fn packed_point_count(&self, field: &FieldSpec) -> u32 {
        match field.bitmap_indicator {
            0 => field.bitmap.map(popcount).unwrap_or(0),
            _ => self.num_points,
        }
    }
}

fn popcount(bitmap: &[u8]) -> u32 {
    bitmap.iter().map(|b| b.count_ones()).sum()
}

/// Lays out a packed simple-packing parameter set as DRT 5.0's five fields:
/// reference value (IEEE-32 bits), binary scale, decimal scale, bit count,
/// and type of original field values (`0` = floating point, Code Table 5.1).
fn simple_packing_param_to_fields(param: &SimplePackingParam) -> [i64; 5] {
    [
        i64::from(f32_to_bits(param.ref_val)),
        i64::from(param.binary_scale),
        i64::from(param.decimal_scale),
        i64::from(param.nbits),
        0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn grid_values() -> Vec<i64> {
        vec![0, 0, 0, 0, 0, 0, 0, 3, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
    }

    #[test]
    fn rejects_operations_before_create() {
        let mut asm = MessageAssembler::new();
        let err = asm.add_local_use(&[]).unwrap_err();
        assert_eq!(err, AssemblerError::NotInitialized);
    }

    #[test]
    fn create_then_add_grid_then_add_field_then_finalize_roundtrips() {
        let mut asm = MessageAssembler::new();
        asm.create(0, &identification()).unwrap();
        asm.add_grid(0, &grid_values(), 6).unwrap();

        let prod_values = vec![1, 2, 0, 0, 5, 0, 0, 1, 6, 1, 0, 0, 255, 0, 0];
        let values = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        asm.add_field_simple_packed(0, &prod_values, &values, 1, 8).unwrap();

        let bytes = asm.finalize().unwrap();
        assert_eq!(&bytes[0..4], b"GRIB");
        assert_eq!(&bytes[bytes.len() - 4..], b"7777");
        let declared_len = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(declared_len as usize, bytes.len());
    }

    #[test]
    fn finalize_before_any_field_is_rejected() {
        let mut asm = MessageAssembler::new();
        asm.create(0, &identification()).unwrap();
        asm.add_grid(0, &grid_values(), 6).unwrap();
        let err = asm.finalize().unwrap_err();
        assert_eq!(err, AssemblerError::BadPredecessorSection);
    }

    #[test]
    fn add_field_without_grid_is_rejected() {
        let mut asm = MessageAssembler::new();
        asm.create(0, &identification()).unwrap();
        let field = FieldSpec {
            prod_tmpl_num: 0,
            prod_values: &[],
            vertical_coords: &[],
            repr_tmpl_num: 0,
            repr_values: &[],
            bitmap_indicator: 255,
            bitmap: None,
            payload: &[],
        };
        let err = asm.add_field(&field).unwrap_err();
        assert_eq!(err, AssemblerError::BadPredecessorSection);
    }

    #[test]
    fn reusing_bitmap_without_a_prior_one_is_rejected() {
        let mut asm = MessageAssembler::new();
        asm.create(0, &identification()).unwrap();
        asm.add_grid(0, &grid_values(), 6).unwrap();
        let field = FieldSpec {
            prod_tmpl_num: 0,
            prod_values: &vec![0i64; 15],
            vertical_coords: &[],
            repr_tmpl_num: 0,
            repr_values: &vec![0i64; 5],
            bitmap_indicator: 254,
            bitmap: None,
            payload: &[],
        };
        let err = asm.add_field(&field).unwrap_err();
        assert_eq!(err, AssemblerError::MissingPriorBitmap);
    }

    #[test]
    fn spectral_drt_requires_spherical_harmonic_grid() {
        let mut asm = MessageAssembler::new();
        asm.create(0, &identification()).unwrap();
        asm.add_grid(0, &grid_values(), 6).unwrap();
        let field = FieldSpec {
            prod_tmpl_num: 0,
            prod_values: &vec![0i64; 15],
            vertical_coords: &[],
            repr_tmpl_num: 50,
            repr_values: &vec![0i64; 5],
            bitmap_indicator: 255,
            bitmap: None,
            payload: &[],
        };
        let err = asm.add_field(&field).unwrap_err();
        assert_eq!(err, AssemblerError::SphericalHarmonicGDTRequired);
    }
}
