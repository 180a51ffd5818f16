//! On-disk index file layout: a 44-octet file header followed by one
//! variable-length record per field, each record opening with a fixed-width
//! header giving the field's location, then a verbatim, self-length-prefixed
//! copy of its Sections 1, 3, 4, 5, and the first 6 octets of Section 6.
//! The same section framing convention used elsewhere in this crate
//! (4-octet length + 1-octet number) is reused here as the length prefix
//! for each copied section.

use super::IndexError;

const MAGIC: &[u8; 4] = b"GB2X";
const FORMAT_VERSION: u16 = 1;
const SOURCE_NAME_FIELD_LEN: usize = 26;
/// Total size of the file-level header: magic(4) + version(2) +
/// record_count(4) + record_header_len(4) + field_count(4) + name(26).
pub const FILE_HEADER_LEN: usize = 4 + 2 + 4 + 4 + 4 + SOURCE_NAME_FIELD_LEN;
/// Size of each record's fixed-width header: message_offset(8) +
/// section4_offset(8) + sequence_in_message(4) + message_length(8) +
/// discipline(1).
pub const RECORD_HEADER_LEN: usize = 8 + 8 + 4 + 8 + 1;

/// One field's location plus a verbatim copy of the sections a search needs
/// to evaluate a wildcarded query without reopening the source file.
/// Section 0 isn't itself duplicated (it never varies within one message),
/// so `discipline` is carried directly in the fixed header instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub message_offset: u64,
    pub section4_offset: u64,
    pub sequence_in_message: u32,
    pub message_length: u64,
    pub discipline: u8,
    pub section1: Box<[u8]>,
    pub section3: Box<[u8]>,
    pub section4: Box<[u8]>,
    pub section5: Box<[u8]>,
    pub section6_head: [u8; 6],
}

impl IndexRecord {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.message_offset.to_be_bytes());
        out.extend_from_slice(&self.section4_offset.to_be_bytes());
        out.extend_from_slice(&self.sequence_in_message.to_be_bytes());
        out.extend_from_slice(&self.message_length.to_be_bytes());
        out.push(self.discipline);
        for section in [&self.section1, &self.section3, &self.section4, &self.section5] {
            out.extend_from_slice(&(section.len() as u32).to_be_bytes());
            out.extend_from_slice(section);
        }
        out.extend_from_slice(&self.section6_head);
    }

    fn read_from(buf: &[u8]) -> Result<(Self, usize), IndexError> {
        let mut pos = 0;
        let take = |pos: &mut usize, n: usize| -> Result<&[u8], IndexError> {
            let slice = buf.get(*pos..*pos + n).ok_or(IndexError::Corrupt("truncated index record"))?;
            *pos += n;
            Ok(slice)
        };

        let message_offset = u64::from_be_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let section4_offset = u64::from_be_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let sequence_in_message = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap());
        let message_length = u64::from_be_bytes(take(&mut pos, 8)?.try_into().unwrap());
        let discipline = take(&mut pos, 1)?[0];

        let mut read_section = |pos: &mut usize| -> Result<Box<[u8]>, IndexError> {
            let len = u32::from_be_bytes(take(pos, 4)?.try_into().unwrap()) as usize;
            Ok(take(pos, len)?.to_vec().into_boxed_slice())
        };
        let section1 = read_section(&mut pos)?;
        let section3 = read_section(&mut pos)?;
        let section4 = read_section(&mut pos)?;
        let section5 = read_section(&mut pos)?;
        let section6_head: [u8; 6] = take(&mut pos, 6)?.try_into().unwrap();

        Ok((
            Self {
                message_offset,
                section4_offset,
                sequence_in_message,
                message_length,
                discipline,
                section1,
                section3,
                section4,
                section5,
                section6_head,
            },
            pos,
        ))
    }
}

/// All index records for one source file.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBuffer {
    pub source_name: String,
    pub records: Vec<IndexRecord>,
}

impl IndexBuffer {
    pub fn new(source_name: impl Into<String>, records: Vec<IndexRecord>) -> Self {
        Self {
            source_name: source_name.into(),
            records,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());
        out.extend_from_slice(&(RECORD_HEADER_LEN as u32).to_be_bytes());
        out.extend_from_slice(&(self.records.len() as u32).to_be_bytes());

        let mut name_field = [0u8; SOURCE_NAME_FIELD_LEN];
        let name_bytes = self.source_name.as_bytes();
        let copy_len = name_bytes.len().min(SOURCE_NAME_FIELD_LEN);
        name_field[..copy_len].copy_from_slice(&name_bytes[..copy_len]);
        out.extend_from_slice(&name_field);

        for record in &self.records {
            record.write_to(&mut out);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        if bytes.len() < FILE_HEADER_LEN {
            return Err(IndexError::Corrupt("index file shorter than its header"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexError::Corrupt("bad index file magic"));
        }
        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt("unsupported index file version"));
        }
        let record_count = u32::from_be_bytes(bytes[6..10].try_into().unwrap()) as usize;
        let name_bytes = &bytes[18..18 + SOURCE_NAME_FIELD_LEN];
        let name_end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let source_name = String::from_utf8_lossy(&name_bytes[..name_end]).into_owned();

        let mut records = Vec::with_capacity(record_count);
        let mut pos = FILE_HEADER_LEN;
        for _ in 0..record_count {
            let (record, consumed) = IndexRecord::read_from(&bytes[pos..])?;
            pos += consumed;
            records.push(record);
        }

        Ok(Self { source_name, records })
    }
}
