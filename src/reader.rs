//! Section framing: turns a byte stream into the [`SectionInfo`] table that
//! [`crate::context::Grib2`] indexes into submessages. Decodes full template
//! bodies through the registry instead of stopping at a fixed-width prefix.

use chrono::{TimeZone, Utc};
use std::io::{self, Read, Seek, SeekFrom};

use crate::context::{
    self, BitMap, GridDefinition, Identification, ProdDefinition, ReprDefinition, SectionBody,
    SectionInfo,
};
use crate::error::{GribError, ParseError};
use crate::helpers::read_as;

const SECT0_IS_MAGIC: &[u8] = b"GRIB";
const SECT0_IS_MAGIC_SIZE: usize = SECT0_IS_MAGIC.len();
const SECT0_IS_SIZE: usize = 16;
const SECT_HEADER_SIZE: usize = 5;
const SECT8_ES_MAGIC: &[u8] = b"7777";
const SECT8_ES_SIZE: usize = SECT8_ES_MAGIC.len();

pub trait Grib2Read: Read + Seek {
    fn scan(&mut self) -> Result<Box<[SectionInfo]>, GribError> {
        let whole_size = self.read_sect0()?;
        let mut rest_size = whole_size - SECT0_IS_SIZE;
        let mut sects = vec![SectionInfo {
            num: 0,
            offset: 0,
            size: SECT0_IS_SIZE,
            body: None,
        }];

        loop {
            if rest_size == SECT8_ES_SIZE {
                self.read_sect8()?;
                sects.push(SectionInfo {
                    num: 8,
                    offset: whole_size - rest_size,
                    size: SECT8_ES_SIZE,
                    body: None,
                });
                break;
            }

            let mut sect_info = self.read_sect_meta()?;
            sect_info.offset = whole_size - rest_size;
            sect_info.body = Some(self.read_sect(&sect_info)?);
            rest_size -= sect_info.size;
            sects.push(sect_info);
        }

        Ok(sects.into_boxed_slice())
    }

    fn read_sect0(&mut self) -> Result<usize, ParseError>;
    fn read_sect8(&mut self) -> Result<(), ParseError>;
    fn read_sect_meta(&mut self) -> Result<SectionInfo, ParseError>;
    fn read_sect(&mut self, meta: &SectionInfo) -> Result<SectionBody, GribError>;
}

pub struct SeekableGrib2Reader<R> {
    reader: R,
}

impl<R> SeekableGrib2Reader<R> {
    pub fn new(r: R) -> Self {
        Self { reader: r }
    }
}

impl<R: Read> Read for SeekableGrib2Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.reader.read_exact(buf)
    }
}

impl<S: Seek> Seek for SeekableGrib2Reader<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl<R: Read + Seek> Grib2Read for SeekableGrib2Reader<R> {
    fn read_sect0(&mut self) -> Result<usize, ParseError> {
        let mut buf = [0; SECT0_IS_SIZE];
        self.read_exact(&mut buf[..])?;

        if buf[0..SECT0_IS_MAGIC_SIZE] != *SECT0_IS_MAGIC {
            return Err(ParseError::NotGRIB);
        }
        let version = buf[7];
        if version != 2 {
            return Err(ParseError::GRIBVersionMismatch(version));
        }

        Ok(read_as!(u64, buf, 8) as usize)
    }

    fn read_sect8(&mut self) -> Result<(), ParseError> {
        let mut buf = [0; SECT8_ES_SIZE];
        self.read_exact(&mut buf[..])?;

        if buf[..] != SECT8_ES_MAGIC[..] {
            return Err(ParseError::EndSectionMismatch);
        }

        Ok(())
    }

    fn read_sect_meta(&mut self) -> Result<SectionInfo, ParseError> {
        let mut buf = [0; SECT_HEADER_SIZE];
        self.read_exact(&mut buf[..])?;

        Ok(SectionInfo {
            num: buf[4],
            offset: 0,
            size: read_as!(u32, buf, 0) as usize,
            body: None,
        })
    }

    fn read_sect(&mut self, meta: &SectionInfo) -> Result<SectionBody, GribError> {
        let body_size = meta.size - SECT_HEADER_SIZE;
        let body = match meta.num {
            1 => unpack_sect1_body(self, body_size)?,
            2 => unpack_sect2_body(self, body_size)?,
            3 => unpack_sect3_body(self, body_size)?,
            4 => unpack_sect4_body(self, body_size)?,
            5 => unpack_sect5_body(self, body_size)?,
            6 => unpack_sect6_body(self, body_size)?,
            7 => unpack_sect7_body(self, body_size)?,
            _ => return Err(ParseError::UnknownSectionNumber(meta.num).into()),
        };

        Ok(body)
    }
}

fn read_fixed<R: Read, const N: usize>(f: &mut R) -> Result<[u8; N], ParseError> {
    let mut buf = [0u8; N];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn unpack_sect1_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let buf = read_fixed::<_, 16>(f)?; // octet 6-21
    skip_extra(f, body_size, buf.len())?;

    Ok(SectionBody::Section1(Identification {
        centre_id: read_as!(u16, buf, 0),
        subcentre_id: read_as!(u16, buf, 2),
        master_table_version: buf[4],
        local_table_version: buf[5],
        ref_time_significance: buf[6],
        ref_time: Utc
            .with_ymd_and_hms(
                read_as!(u16, buf, 7).into(),
                buf[9].into(),
                buf[10].into(),
                buf[11].into(),
                buf[12].into(),
                buf[13].into(),
            )
            .single()
            .ok_or(ParseError::UnexpectedEndOfData)?,
        prod_status: buf[14],
        data_type: buf[15],
    }))
}

pub fn unpack_sect2_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    skip_extra(f, body_size, 0)?;
    Ok(SectionBody::Section2)
}

pub fn unpack_sect3_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let buf = read_fixed::<_, 9>(f)?; // octet 6-14
    let grid_tmpl_num = read_as!(u16, buf, 7);

    let mut raw = vec![0u8; body_size - buf.len()];
    f.read_exact(&mut raw)?;
    let (fields, template_supported, _) = context::decode_template_fields(3, grid_tmpl_num, &raw)?;

    Ok(SectionBody::Section3(GridDefinition {
        num_points: read_as!(u32, buf, 1),
        grid_tmpl_num,
        fields,
        template_supported,
    }))
}

pub fn unpack_sect4_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let buf = read_fixed::<_, 4>(f)?; // octet 6-9
    let num_coordinates = read_as!(u16, buf, 0);
    let prod_tmpl_num = read_as!(u16, buf, 2);

    let mut raw = vec![0u8; body_size - buf.len()];
    f.read_exact(&mut raw)?;

    let (fields, template_supported, consumed) = context::decode_template_fields(4, prod_tmpl_num, &raw)?;

    let vertical_coords = if template_supported {
        raw.get(consumed..)
            .unwrap_or(&[])
            .chunks_exact(4)
            .map(|c| crate::ieee754::bits_to_f32(read_as!(u32, c, 0)))
            .collect::<Vec<_>>()
            .into_boxed_slice()
    } else {
        Box::new([])
    };

    Ok(SectionBody::Section4(ProdDefinition {
        num_coordinates,
        prod_tmpl_num,
        fields,
        template_supported,
        vertical_coords,
    }))
}

pub fn unpack_sect5_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let buf = read_fixed::<_, 6>(f)?; // octet 6-11
    let repr_tmpl_num = read_as!(u16, buf, 4);

    let mut raw = vec![0u8; body_size - buf.len()];
    f.read_exact(&mut raw)?;
    let (fields, template_supported, _) = context::decode_template_fields(5, repr_tmpl_num, &raw)?;

    Ok(SectionBody::Section5(ReprDefinition {
        num_points: read_as!(u32, buf, 0),
        repr_tmpl_num,
        fields,
        template_supported,
    }))
}

pub fn unpack_sect6_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let buf = read_fixed::<_, 1>(f)?; // octet 6
    let bitmap_indicator = buf[0];

    let mut bitmap_bytes = vec![0u8; body_size - buf.len()];
    f.read_exact(&mut bitmap_bytes)?;
    if bitmap_indicator != 0 {
        bitmap_bytes.clear();
    }

    Ok(SectionBody::Section6(BitMap {
        bitmap_indicator,
        bitmap_bytes: bitmap_bytes.into_boxed_slice(),
    }))
}

fn unpack_sect7_body<R: Read>(f: &mut R, body_size: usize) -> Result<SectionBody, GribError> {
    let mut payload = vec![0u8; body_size];
    f.read_exact(&mut payload)?;
    Ok(SectionBody::Section7(payload.into_boxed_slice()))
}

fn skip_extra<R: Read>(f: &mut R, body_size: usize, consumed: usize) -> Result<(), ParseError> {
    let remaining = body_size.checked_sub(consumed).ok_or(ParseError::UnexpectedEndOfData)?;
    if remaining > 0 {
        let mut buf = vec![0; remaining];
        f.read_exact(&mut buf)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sect0(total_len: u64) -> Vec<u8> {
        let mut buf = vec![b'G', b'R', b'I', b'B', 0, 0, 0, 2];
        buf.extend_from_slice(&total_len.to_be_bytes());
        buf
    }

    #[test]
    fn scan_reads_minimal_message() {
        let mut buf = sect0(16 + 21 + 5);
        // Section 1: size=21, num=1, then 16 fixed octets
        buf.extend_from_slice(&21u32.to_be_bytes());
        buf.push(1);
        buf.extend_from_slice(&[0, 34]); // centre
        buf.extend_from_slice(&[0, 0]); // subcentre
        buf.push(5); // master table
        buf.push(1); // local table
        buf.push(0); // significance
        buf.extend_from_slice(&2016u16.to_be_bytes());
        buf.extend_from_slice(&[8, 22, 2, 0, 0]); // month,day,hour,min,sec
        buf.push(0); // prod status
        buf.push(2); // data type
        buf.extend_from_slice(b"7777");

        let mut reader = SeekableGrib2Reader::new(Cursor::new(buf));
        let sects = reader.scan().unwrap();
        assert_eq!(sects.len(), 3);
        assert_eq!(sects[0].num, 0);
        assert_eq!(sects[1].num, 1);
        assert_eq!(sects[2].num, 8);
        match &sects[1].body {
            Some(SectionBody::Section1(id)) => {
                assert_eq!(id.centre_id, 34);
                assert_eq!(id.ref_time.to_string(), "2016-08-22 02:00:00 UTC");
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_grib_magic() {
        let mut reader = SeekableGrib2Reader::new(Cursor::new(vec![0u8; 16]));
        let err = reader.read_sect0().unwrap_err();
        assert_eq!(err, ParseError::NotGRIB);
    }
}
