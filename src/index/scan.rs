//! File scanning (C10): finds every GRIB2 message in a file via a bounded
//! `GRIB` sentinel search, then walks each message's sections directly
//! (rather than through [`crate::context::Grib2`], since indexing wants raw
//! section octets, not decoded values) emitting one [`IndexRecord`] per
//! Section 4, looped across an entire file.

use std::io::{Read, Seek, SeekFrom};

use super::format::{IndexBuffer, IndexRecord};
use crate::error::{GribError, ParseError};

/// Initial bounded window size (octets) searched for the `GRIB` sentinel
/// before falling back to smaller blocks.
const MSK1: usize = 32000;
/// Block size (octets) used for every search window after the first.
const MSK2: usize = 4000;

/// Scans `reader` end to end, returning one record per field found.
/// `source_name` is recorded in the returned buffer's header for later
/// `reload_from`/diagnostic use; it need not be a real filesystem path.
pub fn scan_file<R: Read + Seek>(source_name: &str, reader: &mut R) -> Result<IndexBuffer, GribError> {
    let mut records = Vec::new();
    let mut search_from = 0u64;

    while let Some(message_offset) = find_grib_sentinel(reader, search_from)? {
        let message_records = scan_one_message(reader, message_offset)?;
        let message_length = message_records
            .first()
            .map(|r: &IndexRecord| r.message_length)
            .unwrap_or(4 + 16); // GRIB + minimal Section 0, to make forward progress
        log::debug!("indexed message at offset {message_offset}, {} field(s)", message_records.len());
        records.extend(message_records);
        search_from = message_offset + message_length.max(1);
    }

    Ok(IndexBuffer::new(source_name, records))
}

/// Searches for the next `b"GRIB"` sentinel starting at absolute offset
/// `from`, in a window of `MSK1` octets followed by `MSK2`-octet blocks
/// until EOF. Returns `None` once no more data remains.
fn find_grib_sentinel<R: Read + Seek>(reader: &mut R, from: u64) -> Result<Option<u64>, GribError> {
    reader.seek(SeekFrom::Start(from)).map_err(ParseError::from)?;

    let mut window = MSK1;
    let mut base = from;
    let mut carry: Vec<u8> = Vec::new();

    loop {
        let mut buf = vec![0u8; window];
        let n = read_up_to(reader, &mut buf)?;
        if n == 0 && carry.is_empty() {
            return Ok(None);
        }
        buf.truncate(n);

        let haystack_start = base - carry.len() as u64;
        let mut haystack = std::mem::take(&mut carry);
        haystack.extend_from_slice(&buf);

        if let Some(pos) = find_subslice(&haystack, b"GRIB") {
            return Ok(Some(haystack_start + pos as u64));
        }

        if n < window {
            return Ok(None);
        }

        // Keep the last 3 octets in case the sentinel straddles the boundary.
        let keep = haystack.len().saturating_sub(3);
        carry = haystack[keep..].to_vec();
        base += n as u64;
        window = MSK2;
    }
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, GribError> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).map_err(ParseError::from)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Reads one message's full section framing starting at `message_offset`
/// (where the `GRIB` sentinel begins), returning one record per Section 4.
fn scan_one_message<R: Read + Seek>(reader: &mut R, message_offset: u64) -> Result<Vec<IndexRecord>, GribError> {
    reader.seek(SeekFrom::Start(message_offset)).map_err(ParseError::from)?;

    let mut sect0 = [0u8; 16];
    reader.read_exact(&mut sect0).map_err(ParseError::from)?;
    let discipline = sect0[6];
    let edition = sect0[7];
    if edition != 2 {
        return Err(ParseError::GRIBVersionMismatch(edition).into());
    }
    let message_length = u64::from_be_bytes(sect0[8..16].try_into().unwrap());

    let mut records = Vec::new();
    let mut last_section1: Option<Box<[u8]>> = None;
    let mut last_section3: Option<Box<[u8]>> = None;
    let mut sequence_in_message = 0u32;

    let mut offset = message_offset + 16;
    let end = message_offset + message_length;

    while offset < end {
        reader.seek(SeekFrom::Start(offset)).map_err(ParseError::from)?;
        let mut header = [0u8; 5];
        reader.read_exact(&mut header).map_err(ParseError::from)?;
        let section_len = u32::from_be_bytes(header[0..4].try_into().unwrap()) as u64;
        let section_num = header[4];

        if section_len == 4 && section_num == b'7' {
            // Section 8, the literal "7777" terminator: 4 octets total, no
            // section-number byte of its own; `header` just read its first 5
            // octets as if it were a normal section, so rewind and stop.
            break;
        }

        let mut section_bytes = vec![0u8; section_len as usize];
        section_bytes[..5].copy_from_slice(&header);
        reader.read_exact(&mut section_bytes[5..]).map_err(ParseError::from)?;

        match section_num {
            1 => last_section1 = Some(section_bytes.into_boxed_slice()),
            3 => last_section3 = Some(section_bytes.into_boxed_slice()),
            4 => {
                let section1 = last_section1
                    .clone()
                    .ok_or(ParseError::NoGridDefinition(offset as usize))?;
                let section3 = last_section3
                    .clone()
                    .ok_or(ParseError::NoGridDefinition(offset as usize))?;
                let section4_offset = offset - message_offset;
                let section4 = section_bytes.into_boxed_slice();

                reader.seek(SeekFrom::Start(offset + section_len)).map_err(ParseError::from)?;
                let mut next_header = [0u8; 5];
                reader.read_exact(&mut next_header).map_err(ParseError::from)?;
                let section5_len = u32::from_be_bytes(next_header[0..4].try_into().unwrap()) as u64;
                let mut section5 = vec![0u8; section5_len as usize];
                section5[..5].copy_from_slice(&next_header);
                reader.read_exact(&mut section5[5..]).map_err(ParseError::from)?;

                reader
                    .seek(SeekFrom::Start(offset + section_len + section5_len))
                    .map_err(ParseError::from)?;
                let mut section6_head = [0u8; 6];
                reader.read_exact(&mut section6_head).map_err(ParseError::from)?;

                records.push(IndexRecord {
                    message_offset,
                    section4_offset,
                    sequence_in_message,
                    message_length,
                    discipline,
                    section1,
                    section3,
                    section4,
                    section5: section5.into_boxed_slice(),
                    section6_head,
                });
                sequence_in_message += 1;
            }
            _ => {}
        }

        offset += section_len;
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn minimal_message() -> Vec<u8> {
        let mut buf = vec![b'G', b'R', b'I', b'B', 0, 0, 0, 2];
        let total_len_pos = buf.len();
        buf.extend_from_slice(&0u64.to_be_bytes());

        // Section 1
        buf.extend_from_slice(&21u32.to_be_bytes());
        buf.push(1);
        buf.extend(std::iter::repeat(0u8).take(16));

        // Section 3
        let sect3_body: Vec<u8> = std::iter::repeat(0u8).take(9 + 19 * 4).collect();
        buf.extend_from_slice(&((5 + sect3_body.len()) as u32).to_be_bytes());
        buf.push(3);
        buf.extend(sect3_body);

        // Section 4
        buf.extend_from_slice(&9u32.to_be_bytes());
        buf.push(4);
        buf.extend(std::iter::repeat(0u8).take(4));

        // Section 5
        buf.extend_from_slice(&11u32.to_be_bytes());
        buf.push(5);
        buf.extend(std::iter::repeat(0u8).take(6));

        // Section 6
        buf.extend_from_slice(&7u32.to_be_bytes());
        buf.push(6);
        buf.push(255); // bitmap indicator: none

        // Section 7
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.push(7);

        buf.extend_from_slice(b"7777");

        let total_len = buf.len() as u64;
        buf[total_len_pos..total_len_pos + 8].copy_from_slice(&total_len.to_be_bytes());
        buf
    }

    #[test]
    fn scan_file_finds_sentinel_and_one_record() {
        let data = minimal_message();
        let mut cursor = Cursor::new(data);
        let buffer = scan_file("test.grib2", &mut cursor).unwrap();
        assert_eq!(buffer.records.len(), 1);
        assert_eq!(buffer.records[0].sequence_in_message, 0);
        assert_eq!(buffer.records[0].discipline, 0);
    }

    #[test]
    fn scan_file_handles_leading_garbage() {
        let mut data = vec![0u8; 137];
        data.extend(minimal_message());
        let mut cursor = Cursor::new(data);
        let buffer = scan_file("test.grib2", &mut cursor).unwrap();
        assert_eq!(buffer.records.len(), 1);
        assert_eq!(buffer.records[0].message_offset, 137);
    }

    #[test]
    fn find_subslice_locates_needle() {
        assert_eq!(find_subslice(b"xxxGRIByyy", b"GRIB"), Some(3));
        assert_eq!(find_subslice(b"no sentinel here", b"GRIB"), None);
    }
}
