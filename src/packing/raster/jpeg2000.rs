//! JPEG 2000 codestream packing, Data Representation Template 5.40 (C6).
//! A `NonNull` + `Drop` wrapper around `opj_codec_t`/`opj_image_t`, with a
//! read-callback `Stream` construction generalized to also write a
//! codestream back out.

use std::ffi::c_void;
use std::ptr::NonNull;

use openjpeg_sys as opj;

use crate::packing::PackingError;

struct Slice<'a> {
    offset: usize,
    buf: &'a [u8],
}

impl<'a> Slice<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { offset: 0, buf }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    fn seek(&mut self, new_offset: usize) -> usize {
        self.offset = self.buf.len().min(new_offset);
        self.offset
    }

    fn consume(&mut self, nb_bytes: usize) -> usize {
        self.seek(self.offset.saturating_add(nb_bytes))
    }

    fn read_into(&mut self, out: &mut [u8]) -> Option<usize> {
        if self.remaining() == 0 {
            return None;
        }
        let n = out.len().min(self.remaining());
        let start = self.offset;
        let end = self.consume(n);
        out[..n].copy_from_slice(&self.buf[start..end]);
        Some(n)
    }
}

extern "C" fn read_fn(p_buffer: *mut c_void, nb_bytes: usize, p_data: *mut c_void) -> usize {
    if p_buffer.is_null() || nb_bytes == 0 {
        return usize::MAX;
    }
    let slice = unsafe { &mut *(p_data as *mut Slice) };
    let out = unsafe { std::slice::from_raw_parts_mut(p_buffer as *mut u8, nb_bytes) };
    slice.read_into(out).unwrap_or(usize::MAX)
}

extern "C" fn skip_fn(nb_bytes: i64, p_data: *mut c_void) -> i64 {
    let slice = unsafe { &mut *(p_data as *mut Slice) };
    slice.consume(nb_bytes as usize) as i64
}

extern "C" fn seek_fn(nb_bytes: i64, p_data: *mut c_void) -> i32 {
    let slice = unsafe { &mut *(p_data as *mut Slice) };
    let wanted = nb_bytes as usize;
    i32::from(slice.seek(wanted) == wanted)
}

extern "C" fn free_fn(p_data: *mut c_void) {
    drop(unsafe { Box::from_raw(p_data as *mut Slice) });
}

extern "C" fn write_fn(p_buffer: *mut c_void, nb_bytes: usize, p_data: *mut c_void) -> usize {
    let buf = unsafe { &mut *(p_data as *mut Vec<u8>) };
    let src = unsafe { std::slice::from_raw_parts(p_buffer as *const u8, nb_bytes) };
    buf.extend_from_slice(src);
    nb_bytes
}

extern "C" fn write_free_fn(_p_data: *mut c_void) {}

struct Stream(NonNull<opj::opj_stream_t>);

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe { opj::opj_stream_destroy(self.0.as_ptr()) };
    }
}

impl Stream {
    fn for_read(buf: &[u8]) -> Result<Self, PackingError> {
        let raw = unsafe { opj::opj_stream_create(4096, opj::OPJ_TRUE) };
        let stream = NonNull::new(raw).ok_or(PackingError::Other("stream allocation failed".into()))?;
        let boxed = Box::new(Slice::new(buf));
        unsafe {
            opj::opj_stream_set_read_function(stream.as_ptr(), Some(read_fn));
            opj::opj_stream_set_skip_function(stream.as_ptr(), Some(skip_fn));
            opj::opj_stream_set_seek_function(stream.as_ptr(), Some(seek_fn));
            opj::opj_stream_set_user_data_length(stream.as_ptr(), buf.len() as u64);
            opj::opj_stream_set_user_data(
                stream.as_ptr(),
                Box::into_raw(boxed) as *mut c_void,
                Some(free_fn),
            );
        }
        Ok(Self(stream))
    }

    fn for_write(sink: &mut Vec<u8>) -> Result<Self, PackingError> {
        let raw = unsafe { opj::opj_stream_create(4096, opj::OPJ_FALSE) };
        let stream = NonNull::new(raw).ok_or(PackingError::Other("stream allocation failed".into()))?;
        unsafe {
            opj::opj_stream_set_write_function(stream.as_ptr(), Some(write_fn));
            opj::opj_stream_set_user_data(
                stream.as_ptr(),
                sink as *mut Vec<u8> as *mut c_void,
                Some(write_free_fn),
            );
        }
        Ok(Self(stream))
    }

    fn as_ptr(&self) -> *mut opj::opj_stream_t {
        self.0.as_ptr()
    }
}

struct Codec(NonNull<opj::opj_codec_t>);

impl Drop for Codec {
    fn drop(&mut self) {
        unsafe { opj::opj_destroy_codec(self.0.as_ptr()) };
    }
}

impl Codec {
    fn decompress() -> Result<Self, PackingError> {
        let raw = unsafe { opj::opj_create_decompress(opj::OPJ_CODEC_FORMAT::OPJ_CODEC_J2K) };
        NonNull::new(raw)
            .map(Self)
            .ok_or(PackingError::Other("decoder codec setup failed".into()))
    }

    fn compress() -> Result<Self, PackingError> {
        let raw = unsafe { opj::opj_create_compress(opj::OPJ_CODEC_FORMAT::OPJ_CODEC_J2K) };
        NonNull::new(raw)
            .map(Self)
            .ok_or(PackingError::Other("encoder codec setup failed".into()))
    }

    fn as_ptr(&self) -> *mut opj::opj_codec_t {
        self.0.as_ptr()
    }
}

struct Image(NonNull<opj::opj_image_t>);

impl Drop for Image {
    fn drop(&mut self) {
        unsafe { opj::opj_image_destroy(self.0.as_ptr()) };
    }
}

impl Image {
    fn from_raw(ptr: *mut opj::opj_image_t) -> Result<Self, PackingError> {
        NonNull::new(ptr)
            .map(Self)
            .ok_or(PackingError::Other("JPEG 2000 image allocation failed".into()))
    }

    fn as_ptr(&self) -> *mut opj::opj_image_t {
        self.0.as_ptr()
    }

    fn component(&self) -> &opj::opj_image_comp_t {
        unsafe { &*(*self.0.as_ptr()).comps }
    }
}

/// Decodes a single-component grayscale J2K codestream into `width *
/// height` sample values.
pub fn decode(bytes: &[u8], width: usize, height: usize) -> Result<Vec<i32>, PackingError> {
    let stream = Stream::for_read(bytes)?;
    let codec = Codec::decompress()?;

    let mut params = unsafe { std::mem::zeroed::<opj::opj_dparameters>() };
    unsafe { opj::opj_set_default_decoder_parameters(&mut params) };
    if unsafe { opj::opj_setup_decoder(codec.as_ptr(), &mut params) } != 1 {
        return Err(PackingError::Other("decoder setup failed".into()));
    }

    let mut raw_image: *mut opj::opj_image_t = std::ptr::null_mut();
    if unsafe { opj::opj_read_header(stream.as_ptr(), codec.as_ptr(), &mut raw_image) } != 1 {
        return Err(PackingError::Other("reading JPEG 2000 header failed".into()));
    }
    let image = Image::from_raw(raw_image)?;

    if unsafe { opj::opj_decode(codec.as_ptr(), stream.as_ptr(), image.as_ptr()) } != 1 {
        return Err(PackingError::Other("decoding JPEG 2000 image failed".into()));
    }

    let comp = image.component();
    if comp.w as usize != width || comp.h as usize != height {
        return Err(PackingError::LengthMismatch);
    }
    let len = (comp.w * comp.h) as usize;
    let data = unsafe { std::slice::from_raw_parts(comp.data, len) };
    Ok(data.to_vec())
}

/// Picks the component precision that covers `nbits` of dynamic range:
/// 8, 16, or 24 bits per sample (DRT 5.40 does not use 32-bit JPEG 2000
/// samples the way DRT 5.41's PNG path uses RGBA).
fn depth_for_nbits(nbits: u8) -> Result<u8, PackingError> {
    match nbits {
        0 => Err(PackingError::InvalidParameter("nbits")),
        1..=8 => Ok(8),
        9..=16 => Ok(16),
        17..=24 => Ok(24),
        _ => Err(PackingError::InvalidParameter("nbits")),
    }
}

/// Encodes `levels` (`width * height` of them) as a lossless single-component
/// grayscale J2K codestream, with component precision chosen to cover
/// `nbits` of dynamic range. A degenerate `width < 1` or `height < 1` is
/// rewritten to a single zero pixel, matching the raster codecs' shared
/// convention for keeping the output parseable.
pub fn encode(levels: &[i32], width: usize, height: usize, nbits: u8) -> Result<Vec<u8>, PackingError> {
    let (width, height, levels) = if width < 1 || height < 1 {
        log::warn!("raster packing requested degenerate dimensions {width}x{height}; rewriting to 1x1");
        (1, 1, &[0i32][..])
    } else {
        (width, height, levels)
    };

    if levels.len() != width * height {
        return Err(PackingError::LengthMismatch);
    }
    let bit_depth = depth_for_nbits(nbits)?;

    let mut comp_param = unsafe { std::mem::zeroed::<opj::opj_image_cmptparm_t>() };
    comp_param.dx = 1;
    comp_param.dy = 1;
    comp_param.w = width as u32;
    comp_param.h = height as u32;
    comp_param.x0 = 0;
    comp_param.y0 = 0;
    comp_param.prec = u32::from(bit_depth);
    comp_param.bpp = u32::from(bit_depth);
    comp_param.sgnd = 0;

    let raw_image = unsafe {
        opj::opj_image_create(1, &mut comp_param, opj::OPJ_COLOR_SPACE::OPJ_CLRSPC_GRAY)
    };
    let image = Image::from_raw(raw_image)?;
    unsafe {
        let img = &mut *image.as_ptr();
        img.x0 = 0;
        img.y0 = 0;
        img.x1 = width as u32;
        img.y1 = height as u32;
        let comp = &mut *img.comps;
        let dst = std::slice::from_raw_parts_mut(comp.data, levels.len());
        dst.copy_from_slice(levels);
    }

    let codec = Codec::compress()?;
    let mut params = unsafe { std::mem::zeroed::<opj::opj_cparameters_t>() };
    unsafe { opj::opj_set_default_encoder_parameters(&mut params) };
    params.irreversible = 0; // lossless (5/3 wavelet)
    params.tcp_numlayers = 1;
    params.cp_disto_alloc = 1;

    if unsafe { opj::opj_setup_encoder(codec.as_ptr(), &mut params, image.as_ptr()) } != 1 {
        return Err(PackingError::Other("encoder setup failed".into()));
    }

    let mut sink = Vec::new();
    let stream = Stream::for_write(&mut sink)?;

    let ok = unsafe {
        opj::opj_start_compress(codec.as_ptr(), image.as_ptr(), stream.as_ptr()) == 1
            && opj::opj_encode(codec.as_ptr(), stream.as_ptr()) == 1
            && opj::opj_end_compress(codec.as_ptr(), stream.as_ptr()) == 1
    };
    drop(stream);
    if !ok {
        return Err(PackingError::Other("encoding JPEG 2000 image failed".into()));
    }

    Ok(sink)
}
