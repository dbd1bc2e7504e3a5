//! Planar image buffers handed to the codec.

use crate::coding_parameters::ResolvedParameters;
use crate::error::EncodeError;
use crate::options::PhotometricInterpretation;
use crate::source::{Geometry, NativeSample, SourceBuffer};

/// One sample plane of a [`PlanarImage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageComponent {
    /// Number of significant bits per sample (bits stored).
    pub precision: u8,
    /// true if samples are two's complement signed.
    pub signed: bool,
    /// Horizontal subsampling factor, always 1.
    pub dx: u32,
    /// Vertical subsampling factor, always 1.
    pub dy: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major samples, see [`planar_offset`].
    pub data: Vec<i32>,
}

impl ImageComponent {
    pub fn sample(&self, column: usize, row: usize) -> Option<i32> {
        if column >= self.width as usize {
            return None;
        }
        self.data.get(planar_offset(column, row, self.width as usize)).copied()
    }
}

/// Component-planar image on the reference grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanarImage {
    pub components: Vec<ImageComponent>,
    /// Horizontal offset of the image area on the reference grid.
    pub x0: u32,
    /// Vertical offset of the image area on the reference grid.
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
    pub color_space: PhotometricInterpretation,
}

/// Offset of `(column, row)` inside a plane of the given width.
pub const fn planar_offset(column: usize, row: usize, width: usize) -> usize {
    column + width * row
}

impl PlanarImage {
    /// Allocates one zeroed plane per sample, failing instead of aborting when
    /// the allocation cannot be satisfied.
    pub fn allocate(parameters: &ResolvedParameters) -> Result<Self, EncodeError> {
        let width = parameters.columns;
        let height = parameters.rows;
        let plane_len = (width as usize)
            .checked_mul(height as usize)
            .ok_or(EncodeError::ImageAllocationFailed)?;

        let mut components = Vec::new();
        components
            .try_reserve_exact(parameters.samples_per_pixel as usize)
            .map_err(|_| EncodeError::ImageAllocationFailed)?;
        for _ in 0..parameters.samples_per_pixel {
            let mut data = Vec::new();
            data.try_reserve_exact(plane_len)
                .map_err(|_| EncodeError::ImageAllocationFailed)?;
            data.resize(plane_len, 0);
            components.push(ImageComponent {
                precision: parameters.bits_stored,
                signed: parameters.is_signed,
                dx: 1,
                dy: 1,
                width,
                height,
                data,
            });
        }

        Ok(Self {
            components,
            x0: 0,
            y0: 0,
            x1: width,
            y1: height,
            color_space: parameters.photometric_interpretation,
        })
    }

    /// Allocates the image and copies every sample of `source` into it.
    pub fn from_source(
        source: &SourceBuffer<'_>,
        geometry: &Geometry,
        parameters: &ResolvedParameters,
    ) -> Result<Self, EncodeError> {
        let mut image = Self::allocate(parameters)?;
        match (parameters.bits_allocated, parameters.is_signed) {
            (8, true) => image.copy_planes::<i8>(source, geometry)?,
            (8, false) => image.copy_planes::<u8>(source, geometry)?,
            (16, true) => image.copy_planes::<i16>(source, geometry)?,
            _ => image.copy_planes::<u16>(source, geometry)?,
        }
        Ok(image)
    }

    fn copy_planes<T: NativeSample>(
        &mut self,
        source: &SourceBuffer<'_>,
        geometry: &Geometry,
    ) -> Result<(), EncodeError> {
        let view = source
            .view::<T>(geometry)
            .ok_or(EncodeError::UnsupportedDType)?;
        let width = geometry.width();
        for (plane, component) in self.components.iter_mut().enumerate() {
            for row in 0..geometry.height() {
                for column in 0..width {
                    let value = view
                        .get(row, column, plane)
                        .ok_or(EncodeError::NonContiguousBuffer)?;
                    component.data[planar_offset(column, row, width)] = value.into();
                }
            }
        }
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}
