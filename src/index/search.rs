//! Wildcarded index search (C12): evaluates [`crate::parser::FieldQuery`]
//! against every record in an [`IndexBuffer`] without reopening the source
//! file, decoding each record's embedded sections just far enough to run
//! the same match test a live message walk would use.

use std::io::Cursor;

use super::format::{IndexBuffer, IndexRecord};
use super::SearchError;
use crate::context::{GridDefinition, Identification, ProdDefinition, SectionBody};
use crate::error::GribError;
use crate::parser::FieldQuery;
use crate::reader::{unpack_sect1_body, unpack_sect3_body, unpack_sect4_body};

const SECT_HEADER_SIZE: usize = 5;

/// Returns the first record in `buffer` matching `query`, or
/// [`SearchError::NotFound`].
pub fn search<'a>(buffer: &'a IndexBuffer, query: &FieldQuery) -> Result<&'a IndexRecord, GribError> {
    for record in &buffer.records {
        if record_matches(record, query)? {
            return Ok(record);
        }
    }
    Err(SearchError::NotFound.into())
}

fn record_matches(record: &IndexRecord, query: &FieldQuery) -> Result<bool, GribError> {
    let identification = decode_identification(&record.section1)?;
    let grid = decode_grid(&record.section3)?;
    let prod = decode_prod(&record.section4)?;
    Ok(query.matches(record.discipline, &identification, &grid, &prod))
}

fn decode_identification(raw: &[u8]) -> Result<Identification, GribError> {
    let mut cursor = Cursor::new(&raw[SECT_HEADER_SIZE..]);
    match unpack_sect1_body(&mut cursor, raw.len() - SECT_HEADER_SIZE)? {
        SectionBody::Section1(id) => Ok(id),
        _ => unreachable!("unpack_sect1_body always returns Section1"),
    }
}

fn decode_grid(raw: &[u8]) -> Result<GridDefinition, GribError> {
    let mut cursor = Cursor::new(&raw[SECT_HEADER_SIZE..]);
    match unpack_sect3_body(&mut cursor, raw.len() - SECT_HEADER_SIZE)? {
        SectionBody::Section3(grid) => Ok(grid),
        _ => unreachable!("unpack_sect3_body always returns Section3"),
    }
}

fn decode_prod(raw: &[u8]) -> Result<ProdDefinition, GribError> {
    let mut cursor = Cursor::new(&raw[SECT_HEADER_SIZE..]);
    match unpack_sect4_body(&mut cursor, raw.len() - SECT_HEADER_SIZE)? {
        SectionBody::Section4(prod) => Ok(prod),
        _ => unreachable!("unpack_sect4_body always returns Section4"),
    }
}
