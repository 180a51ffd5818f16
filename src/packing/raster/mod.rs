//! Raster-image-backed packing: Data Representation Templates 5.40 (JPEG
//! 2000) and 5.41 (PNG), C6. Both reduce to simple packing plus an image
//! codec standing in for the bit-plane payload, so both submodules share
//! [`SimplePackingParam`](super::SimplePackingParam) for the physical-value
//! conversion and only differ in how the integer levels are serialized.

#[cfg(feature = "jpeg2000-support-openjpeg")]
pub mod jpeg2000;
#[cfg(feature = "png-support")]
pub mod png;
