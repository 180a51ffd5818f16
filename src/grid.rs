//! Grid geometry helpers (C15, supplemented). Only Grid Definition Template
//! 3.0 (regular latitude/longitude grid) is modeled, the simplest and most
//! common case; everything else is out of the registry's scope.

/// Bit flags of GRIB2 Code Table 3.4, "Scanning mode".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanningMode(pub u8);

impl ScanningMode {
    pub fn scans_positively_for_i(&self) -> bool {
        self.0 & 0b1000_0000 == 0
    }

    pub fn scans_positively_for_j(&self) -> bool {
        self.0 & 0b0100_0000 != 0
    }

    pub fn is_consecutive_for_i(&self) -> bool {
        self.0 & 0b0010_0000 == 0
    }

    pub fn scans_alternating_rows(&self) -> bool {
        self.0 & 0b0001_0000 != 0
    }

    pub fn has_unsupported_flags(&self) -> bool {
        self.0 & 0b0000_1111 != 0
    }
}

/// Decoded values of Grid Definition Template 3.0, enough to iterate grid
/// points and to tell the raster packers (C6) the pixel grid's shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonGridDefinition {
    pub ni: u32,
    pub nj: u32,
    pub first_lat: f64,
    pub first_lon: f64,
    pub last_lat: f64,
    pub last_lon: f64,
    pub di: f64,
    pub dj: f64,
    pub scanning_mode: ScanningMode,
}

/// Index of each Grid Definition Template 3.0 field used by
/// [`LatLonGridDefinition::from_gdt_3_0_fields`], matching the declaration
/// order in the template registry.
mod gdt_3_0_field {
    pub const NI: usize = 7;
    pub const NJ: usize = 8;
    pub const LA1: usize = 11;
    pub const LO1: usize = 12;
    pub const LA2: usize = 14;
    pub const LO2: usize = 15;
    pub const DI: usize = 16;
    pub const DJ: usize = 17;
    pub const SCANNING_MODE: usize = 18;
}

/// GDT 3.0 stores latitudes/longitudes/increments as integers scaled by this
/// factor (millionths of a degree), per WMO Grid Definition Template 3.0.
const GDT_3_0_DEGREE_SCALE: f64 = 1e-6;

impl LatLonGridDefinition {
    /// Builds grid geometry from a decoded Grid Definition Template 3.0
    /// field list (as produced by [`crate::context::decode_template_fields`]).
    /// Returns `None` if `fields` is shorter than the template's 19 entries.
    pub fn from_gdt_3_0_fields(fields: &[i64]) -> Option<Self> {
        use gdt_3_0_field::*;
        let get = |i: usize| fields.get(i).copied();
        Some(Self {
            ni: get(NI)? as u32,
            nj: get(NJ)? as u32,
            first_lat: get(LA1)? as f64 * GDT_3_0_DEGREE_SCALE,
            first_lon: get(LO1)? as f64 * GDT_3_0_DEGREE_SCALE,
            last_lat: get(LA2)? as f64 * GDT_3_0_DEGREE_SCALE,
            last_lon: get(LO2)? as f64 * GDT_3_0_DEGREE_SCALE,
            di: get(DI)? as f64 * GDT_3_0_DEGREE_SCALE,
            dj: get(DJ)? as f64 * GDT_3_0_DEGREE_SCALE,
            scanning_mode: ScanningMode(get(SCANNING_MODE)? as u8),
        })
    }

    /// The `(width, height)` a raster packer should render grid values into,
    /// before any bitmap contraction.
    pub fn raster_shape(&self) -> (usize, usize) {
        (self.ni as usize, self.nj as usize)
    }

    pub fn latitudes(&self) -> Vec<f32> {
        linspace(self.first_lat, self.last_lat, self.nj as usize)
    }

    pub fn longitudes(&self) -> Vec<f32> {
        linspace(self.first_lon, self.last_lon, self.ni as usize)
    }

    pub fn iter_points(&self) -> LatLonGridIterator {
        let (major, minor) = if self.scanning_mode.is_consecutive_for_i() {
            (self.latitudes(), self.longitudes())
        } else {
            (self.longitudes(), self.latitudes())
        };
        LatLonGridIterator::new(major, minor, self.scanning_mode)
    }
}

fn linspace(start: f64, end: f64, count: usize) -> Vec<f32> {
    if count <= 1 {
        return vec![start as f32; count];
    }
    let step = (end - start) / (count as f64 - 1.0);
    (0..count).map(|i| (start + step * i as f64) as f32).collect()
}

pub struct LatLonGridIterator {
    major: Vec<f32>,
    minor: Vec<f32>,
    scanning_mode: ScanningMode,
    major_pos: usize,
    minor_pos: usize,
    increments: bool,
}

impl LatLonGridIterator {
    pub fn new(major: Vec<f32>, minor: Vec<f32>, scanning_mode: ScanningMode) -> Self {
        Self {
            major,
            minor,
            scanning_mode,
            minor_pos: 0,
            major_pos: 0,
            increments: true,
        }
    }
}

impl Iterator for LatLonGridIterator {
    type Item = (f32, f32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.major_pos == self.major.len() {
            return None;
        }

        let minor_pos = if self.increments {
            self.minor_pos
        } else {
            self.minor.len() - self.minor_pos - 1
        };
        let minor = self.minor[minor_pos];
        let major = self.major[self.major_pos];

        self.minor_pos += 1;
        if self.minor_pos == self.minor.len() {
            self.major_pos += 1;
            self.minor_pos = 0;
            if self.scanning_mode.scans_alternating_rows() {
                self.increments = !self.increments;
            }
        }

        if self.scanning_mode.is_consecutive_for_i() {
            Some((major, minor))
        } else {
            Some((minor, major))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.major.len() * self.minor.len();
        (len, Some(len))
    }
}
