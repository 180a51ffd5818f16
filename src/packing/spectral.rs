//! Spherical harmonic coefficient packing, Data Representation Templates
//! 5.50 (simple packing of the coefficients) and 5.51 (complex packing with
//! a separately-stored real part of the (0,0) coefficient), C7.
//!
//! Unlike the grid-point templates, the payload here is a flat list of
//! complex coefficients indexed by total wavenumber rather than a raster of
//! physical values, truncated triangularly at `(j, k, m)`. Grounded on the
//! teacher's simple-packing decoder, generalized to the coefficient-count
//! bookkeeping the spherical harmonic templates add.

use super::{simple, PackingError, SimplePackingParam};

/// Triangular truncation parameters shared by DRT 5.50/5.51.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    pub j: u32,
    pub k: u32,
    pub m: u32,
}

impl Truncation {
    /// Number of complex coefficients a triangular truncation at `(j, k, m)`
    /// holds, one per `(n, m)` pair with `m <= n <= j` (the common case where
    /// `j == k == m`, the only triangular truncation Section 5 currently
    /// defines).
    pub fn coefficient_count(&self) -> Result<usize, PackingError> {
        if self.j == 0 && self.k == 0 && self.m == 0 {
            return Err(PackingError::UnsupportedTruncation);
        }
        if self.j != self.k || self.k != self.m {
            return Err(PackingError::NotSupported("DRT 5.50/5.51 truncation shape", 0));
        }
        let n = self.j as usize;
        Ok((n + 1) * (n + 2) / 2)
    }
}

/// Decodes DRT 5.50: every coefficient, including (0,0), is simple-packed
/// together.
pub fn unpack_simple(payload: &[u8], param: &SimplePackingParam, truncation: Truncation) -> Result<Vec<f32>, PackingError> {
    let count = truncation.coefficient_count()?;
    let values = simple::unpack(payload, param, count);
    if values.len() != count {
        return Err(PackingError::LengthMismatch);
    }
    Ok(values)
}

/// Packs `coefficients` (real parts only, ordered `(0,0), (0,1), (1,1), ...`)
/// via simple packing.
pub fn pack_simple(coefficients: &[f32], decimal_scale: i16, nbits: u8, truncation: Truncation) -> Result<(SimplePackingParam, Vec<u8>), PackingError> {
    let count = truncation.coefficient_count()?;
    if coefficients.len() != count {
        return Err(PackingError::LengthMismatch);
    }
    simple::pack(coefficients, decimal_scale, nbits)
}

/// Decodes DRT 5.51: the (0,0) coefficient is stored verbatim as an IEEE
/// 32-bit float ahead of the packed payload, and the remaining coefficients
/// are simple-packed relative to `param`.
pub fn unpack_complex(
    leading_coefficient: f32,
    payload: &[u8],
    param: &SimplePackingParam,
    truncation: Truncation,
) -> Result<Vec<f32>, PackingError> {
    let count = truncation.coefficient_count()?;
    if count == 0 {
        return Err(PackingError::UnsupportedTruncation);
    }
    let rest = simple::unpack(payload, param, count - 1);
    let mut out = Vec::with_capacity(count);
    out.push(leading_coefficient);
    out.extend(rest);
    Ok(out)
}

/// Inverse of [`unpack_complex`]: returns the leading coefficient to store
/// verbatim plus the packed parameters/payload for the rest.
pub fn pack_complex(
    coefficients: &[f32],
    decimal_scale: i16,
    nbits: u8,
    truncation: Truncation,
) -> Result<(f32, SimplePackingParam, Vec<u8>), PackingError> {
    let count = truncation.coefficient_count()?;
    if coefficients.len() != count {
        return Err(PackingError::LengthMismatch);
    }
    let leading = coefficients[0];
    let (param, bytes) = simple::pack(&coefficients[1..], decimal_scale, nbits)?;
    Ok((leading, param, bytes))
}
