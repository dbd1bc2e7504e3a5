//! Read-only views over caller-owned sample arrays.
//!
//! A [`SourceBuffer`] describes a rank 2 `(rows, columns)` or rank 3
//! `(rows, columns, samples)` array the way numpy's array interface does:
//! raw bytes, a shape, an element type, a byte order and optional byte
//! strides. [`SourceBuffer::validate`] decides whether the array can be
//! encoded at all before anything is allocated.

use std::marker::PhantomData;

use crate::constants::{MAX_DIMENSION, MIN_DIMENSION, SUPPORTED_SAMPLE_COUNTS};
use crate::error::EncodeError;

/// Element type of a source array.
///
/// Only the first five kinds are encodable; the others exist so that arrays
/// holding them can be described and rejected with a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float16,
    Float32,
    Float64,
}

impl DType {
    pub const fn item_size(self) -> usize {
        match self {
            DType::Bool | DType::Int8 | DType::UInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::Float16 => 2,
            DType::Int32 | DType::UInt32 | DType::Float32 => 4,
            DType::Int64 | DType::UInt64 | DType::Float64 => 8,
        }
    }

    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            DType::Bool | DType::Int8 | DType::UInt8 | DType::Int16 | DType::UInt16
        )
    }

    /// Storage width of one sample in the encoder: 8 for the single byte
    /// kinds, 16 otherwise.
    pub const fn bits_allocated(self) -> u8 {
        if self.item_size() == 1 { 8 } else { 16 }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64
        )
    }

    /// Parses a numpy array-interface type string such as `"<u2"`, `"|b1"`
    /// or `">i2"` into an element type and byte order.
    pub fn from_typestr(typestr: &str) -> Result<(DType, ByteOrder), EncodeError> {
        let mut chars = typestr.chars();
        let (byte_order, kind) = match chars.next() {
            Some('<') => (ByteOrder::Little, chars.next()),
            Some('>') => (ByteOrder::Big, chars.next()),
            Some('=') => (ByteOrder::Native, chars.next()),
            Some('|') => (ByteOrder::NotApplicable, chars.next()),
            other => (ByteOrder::Native, other),
        };
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| EncodeError::UnsupportedDType)?;

        let dtype = match (kind, size) {
            (Some('b'), 1) => DType::Bool,
            (Some('i'), 1) => DType::Int8,
            (Some('u'), 1) => DType::UInt8,
            (Some('i'), 2) => DType::Int16,
            (Some('u'), 2) => DType::UInt16,
            (Some('i'), 4) => DType::Int32,
            (Some('u'), 4) => DType::UInt32,
            (Some('i'), 8) => DType::Int64,
            (Some('u'), 8) => DType::UInt64,
            (Some('f'), 2) => DType::Float16,
            (Some('f'), 4) => DType::Float32,
            (Some('f'), 8) => DType::Float64,
            _ => return Err(EncodeError::UnsupportedDType),
        };
        Ok((dtype, byte_order))
    }
}

/// Byte order of the samples in a source array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Whatever the encoding host uses.
    #[default]
    Native,
    Little,
    Big,
    /// Single byte element types have no byte order.
    NotApplicable,
}

impl ByteOrder {
    pub const fn is_native(self) -> bool {
        match self {
            ByteOrder::Native | ByteOrder::NotApplicable => true,
            ByteOrder::Little => cfg!(target_endian = "little"),
            ByteOrder::Big => cfg!(target_endian = "big"),
        }
    }
}

/// Rust element types that map directly onto a [`DType`].
pub trait Sample: bytemuck::NoUninit {
    const DTYPE: DType;
}

macro_rules! impl_sample {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(impl Sample for $ty {
            const DTYPE: DType = DType::$dtype;
        })*
    };
}

impl_sample!(
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

/// Geometry derived from a validated source array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub rows: u32,
    pub columns: u32,
    pub samples_per_pixel: u16,
}

impl Geometry {
    pub const fn width(&self) -> usize {
        self.columns as usize
    }

    pub const fn height(&self) -> usize {
        self.rows as usize
    }

    pub const fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }
}

/// A read-only view over a caller-owned numeric array.
#[derive(Debug, Clone)]
pub struct SourceBuffer<'a> {
    data: &'a [u8],
    shape: Vec<usize>,
    strides: Option<Vec<isize>>,
    dtype: DType,
    byte_order: ByteOrder,
}

impl<'a> SourceBuffer<'a> {
    /// Describes `data` as a C-contiguous, native byte order array.
    pub fn new(data: &'a [u8], shape: &[usize], dtype: DType) -> Self {
        let byte_order = if dtype.item_size() == 1 {
            ByteOrder::NotApplicable
        } else {
            ByteOrder::Native
        };
        Self {
            data,
            shape: shape.to_vec(),
            strides: None,
            dtype,
            byte_order,
        }
    }

    pub fn from_samples<T: Sample>(samples: &'a [T], shape: &[usize]) -> Self {
        Self::new(bytemuck::cast_slice(samples), shape, T::DTYPE)
    }

    pub fn from_typestr(
        data: &'a [u8],
        shape: &[usize],
        typestr: &str,
    ) -> Result<Self, EncodeError> {
        let (dtype, byte_order) = DType::from_typestr(typestr)?;
        Ok(Self::new(data, shape, dtype).with_byte_order(byte_order))
    }

    /// Byte strides per dimension, as reported by numpy.
    pub fn with_strides(mut self, strides: &[isize]) -> Self {
        self.strides = Some(strides.to_vec());
        self
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Returns `(rows, columns, samples_per_pixel)` for an encodable array.
    pub fn validate(&self) -> Result<Geometry, EncodeError> {
        let (rows, columns, samples_per_pixel) = match self.shape[..] {
            [rows, columns] => (rows, columns, 1),
            [rows, columns, samples] => {
                if !SUPPORTED_SAMPLE_COUNTS.contains(&samples) {
                    return Err(EncodeError::UnsupportedSampleCount);
                }
                (rows, columns, samples)
            }
            _ => return Err(EncodeError::UnsupportedRank),
        };

        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&rows) {
            return Err(EncodeError::RowsOutOfRange);
        }
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&columns) {
            return Err(EncodeError::ColumnsOutOfRange);
        }

        if !self.dtype.is_supported() {
            return Err(EncodeError::UnsupportedDType);
        }
        if self.dtype.item_size() > 1 && !self.byte_order.is_native() {
            return Err(EncodeError::UnsupportedByteOrder);
        }
        if !self.is_c_contiguous() {
            return Err(EncodeError::NonContiguousBuffer);
        }

        Ok(Geometry {
            rows: rows as u32,
            columns: columns as u32,
            samples_per_pixel: samples_per_pixel as u16,
        })
    }

    fn is_c_contiguous(&self) -> bool {
        let item_size = self.dtype.item_size();
        let byte_len = self
            .shape
            .iter()
            .try_fold(item_size, |acc, &dim| acc.checked_mul(dim));
        if byte_len != Some(self.data.len()) {
            return false;
        }
        if (self.data.as_ptr() as usize) % item_size != 0 {
            return false;
        }

        if let Some(strides) = &self.strides {
            if strides.len() != self.shape.len() {
                return false;
            }
            let mut expected = item_size as isize;
            for (&dim, &stride) in self.shape.iter().zip(strides).rev() {
                // numpy leaves the stride of a unit dimension unconstrained
                if dim > 1 && stride != expected {
                    return false;
                }
                expected *= dim as isize;
            }
        }
        true
    }

    /// Typed, bounds-checked view indexed by `(row, column, plane)`.
    ///
    /// Returns `None` when `T` does not match the element width.
    pub fn view<T: NativeSample>(&self, geometry: &Geometry) -> Option<SampleView<'a, T>> {
        (T::SIZE == self.dtype.item_size()).then(|| SampleView {
            bytes: self.data,
            columns: geometry.width(),
            samples: geometry.samples_per_pixel as usize,
            _marker: PhantomData,
        })
    }

    /// Value at `(row, column, plane)` widened to `i32`, for supported types.
    pub fn sample(&self, geometry: &Geometry, row: usize, column: usize, plane: usize) -> Option<i32> {
        match self.dtype {
            DType::Bool | DType::UInt8 => self.view::<u8>(geometry)?.get(row, column, plane).map(i32::from),
            DType::Int8 => self.view::<i8>(geometry)?.get(row, column, plane).map(i32::from),
            DType::UInt16 => self.view::<u16>(geometry)?.get(row, column, plane).map(i32::from),
            DType::Int16 => self.view::<i16>(geometry)?.get(row, column, plane).map(i32::from),
            _ => None,
        }
    }
}

/// Sample types that can be read out of native byte order storage.
pub trait NativeSample: Copy + Into<i32> {
    const SIZE: usize;
    fn from_ne(bytes: &[u8]) -> Self;
}

impl NativeSample for u8 {
    const SIZE: usize = 1;
    fn from_ne(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl NativeSample for i8 {
    const SIZE: usize = 1;
    fn from_ne(bytes: &[u8]) -> Self {
        i8::from_ne_bytes([bytes[0]])
    }
}

impl NativeSample for u16 {
    const SIZE: usize = 2;
    fn from_ne(bytes: &[u8]) -> Self {
        u16::from_ne_bytes([bytes[0], bytes[1]])
    }
}

impl NativeSample for i16 {
    const SIZE: usize = 2;
    fn from_ne(bytes: &[u8]) -> Self {
        i16::from_ne_bytes([bytes[0], bytes[1]])
    }
}

/// Row-major `(row, column, plane)` accessor over validated storage.
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a, T> {
    bytes: &'a [u8],
    columns: usize,
    samples: usize,
    _marker: PhantomData<T>,
}

impl<T: NativeSample> SampleView<'_, T> {
    pub fn get(&self, row: usize, column: usize, plane: usize) -> Option<T> {
        if column >= self.columns || plane >= self.samples {
            return None;
        }
        let start = ((row * self.columns + column) * self.samples + plane) * T::SIZE;
        self.bytes.get(start..start + T::SIZE).map(T::from_ne)
    }
}
