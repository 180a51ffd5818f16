use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;

use crate::assembler::AssemblerError;
use crate::index::{IndexError, SearchError};
use crate::packing::PackingError;
use crate::templates::TemplateError;

/// Top-level error type returned at the crate boundary. Every more specific
/// error kind (`ParseError`, `AssemblerError`, ...) folds into this one via
/// `From`.
#[derive(Debug, Clone, PartialEq)]
pub enum GribError {
    InternalDataError,
    ParseError(ParseError),
    DecodeError(DecodeError),
    AssemblerError(AssemblerError),
    PackingError(PackingError),
    TemplateError(TemplateError),
    IndexError(IndexError),
    SearchError(SearchError),
}

impl Error for GribError {}

impl Display for GribError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::InternalDataError => write!(f, "something unexpected happened"),
            Self::ParseError(e) => write!(f, "{e}"),
            Self::DecodeError(e) => write!(f, "{e}"),
            Self::AssemblerError(e) => write!(f, "{e}"),
            Self::PackingError(e) => write!(f, "{e}"),
            Self::TemplateError(e) => write!(f, "{e}"),
            Self::IndexError(e) => write!(f, "{e}"),
            Self::SearchError(e) => write!(f, "{e}"),
        }
    }
}

macro_rules! impl_from_for_grib_error {
    ($($variant:ident($ty:ty),)*) => {$(
        impl From<$ty> for GribError {
            fn from(e: $ty) -> Self {
                Self::$variant(e)
            }
        }
    )*};
}

impl_from_for_grib_error! {
    ParseError(ParseError),
    DecodeError(DecodeError),
    AssemblerError(AssemblerError),
    PackingError(PackingError),
    TemplateError(TemplateError),
    IndexError(IndexError),
    SearchError(SearchError),
}

/// Errors raised while reading the section framing of a message (envelope,
/// section ordering, truncated data).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParseError {
    ReadError(String),
    NotGRIB,
    GRIBVersionMismatch(u8),
    UnknownSectionNumber(u8),
    EndSectionMismatch,
    TotalLengthMismatch { declared: u64, actual: u64 },
    UnexpectedEndOfData,
    InvalidSectionOrder(usize),
    NoGridDefinition(usize),
}

impl Error for ParseError {}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::ReadError(s) => write!(f, "read error: {s}"),
            Self::NotGRIB => write!(f, "not GRIB data"),
            Self::GRIBVersionMismatch(v) => write!(f, "not GRIB edition 2: edition {v}"),
            Self::UnknownSectionNumber(n) => write!(f, "unknown section number: {n}"),
            Self::EndSectionMismatch => write!(f, "content of End Section is not valid"),
            Self::TotalLengthMismatch { declared, actual } => write!(
                f,
                "Section 0 declares length {declared} but the stream contains {actual}"
            ),
            Self::UnexpectedEndOfData => write!(f, "unexpected end of data"),
            Self::InvalidSectionOrder(offset) => {
                write!(f, "GRIB2 sections wrongly ordered at offset {offset}")
            }
            Self::NoGridDefinition(offset) => {
                write!(f, "Grid Definition Section not found before offset {offset}")
            }
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::ReadError(e.to_string())
    }
}

impl From<io::Error> for GribError {
    fn from(e: io::Error) -> Self {
        Self::ParseError(ParseError::from(e))
    }
}

/// Errors raised by the grid-point value decoders (the inverse of C4/C5/C6/C7).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DecodeError {
    NotSupported(&'static str, u16),
    LengthMismatch,
    UnsupportedTruncation,
    UnclassifiedError(String),
}

impl Error for DecodeError {}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::NotSupported(table, code) => write!(f, "unsupported value in {table}: {code}"),
            Self::LengthMismatch => write!(f, "decoded length does not match the expected grid size"),
            Self::UnsupportedTruncation => write!(f, "spherical harmonic truncation parameters are all zero"),
            Self::UnclassifiedError(s) => write!(f, "{s}"),
        }
    }
}

impl From<String> for DecodeError {
    fn from(value: String) -> Self {
        Self::UnclassifiedError(value)
    }
}

impl From<&str> for DecodeError {
    fn from(value: &str) -> Self {
        Self::UnclassifiedError(value.to_owned())
    }
}
