//! C Foreign Function Interface for j2karray-rs.
//!
//! A single entry point, [`j2karray_encode`], takes a numpy-style array
//! descriptor and a table of output callbacks and returns the integer status
//! of the encode: `0` on success, a positive [`EncodeError`] code on failure
//! and `-1` for null or malformed pointer arguments.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::io;

use crate::error::EncodeError;
use crate::options::EncodeOptions;
use crate::source::SourceBuffer;
use crate::stream::Sink;

/// Status returned for null or malformed pointer arguments.
pub const J2KARRAY_INVALID_ARGUMENT: c_int = -1;

/// Describes a caller-owned array, mirroring numpy's array interface.
#[repr(C)]
pub struct J2kArrayDesc {
    pub data: *const u8,
    /// Size of `data` in bytes.
    pub len: usize,
    /// NUL-terminated typestr such as `"|u1"` or `"<i2"`.
    pub typestr: *const c_char,
    pub shape: *const usize,
    pub ndim: usize,
    /// Byte strides, `ndim` entries; null for a C-contiguous array.
    pub strides: *const isize,
}

/// Encoding options as integer tags.
#[repr(C)]
pub struct J2kEncodeParams {
    pub bits_stored: c_int,
    pub photometric_interpretation: c_int,
    pub use_mct: bool,
    pub lossless: bool,
    pub compression_ratios: *const f64,
    pub ratio_count: usize,
    pub codec_format: c_int,
}

/// Writes up to `len` bytes, returns the count taken or a negative value on error.
pub type J2kWriteFn = unsafe extern "C" fn(user_data: *mut c_void, data: *const u8, len: usize) -> isize;
/// Seeks to an absolute position, returns `0` on success.
pub type J2kSeekFn = unsafe extern "C" fn(user_data: *mut c_void, position: u64) -> c_int;
/// Moves relative to the current position, returns `0` on success.
pub type J2kSkipFn = unsafe extern "C" fn(user_data: *mut c_void, offset: i64) -> c_int;

/// Output destination as a set of callbacks sharing `user_data`.
#[repr(C)]
pub struct J2kSinkCallbacks {
    pub user_data: *mut c_void,
    pub write: Option<J2kWriteFn>,
    pub seek: Option<J2kSeekFn>,
    pub skip: Option<J2kSkipFn>,
}

struct CallbackSink {
    user_data: *mut c_void,
    write: J2kWriteFn,
    seek: J2kSeekFn,
    skip: J2kSkipFn,
}

fn callback_failed(operation: &str) -> io::Error {
    io::Error::other(format!("{operation} callback reported failure"))
}

impl Sink for CallbackSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = unsafe { (self.write)(self.user_data, buf.as_ptr(), buf.len()) };
        usize::try_from(written)
            .ok()
            .filter(|&n| n <= buf.len())
            .ok_or_else(|| callback_failed("write"))
    }

    fn seek(&mut self, position: u64) -> io::Result<()> {
        match unsafe { (self.seek)(self.user_data, position) } {
            0 => Ok(()),
            _ => Err(callback_failed("seek")),
        }
    }

    fn skip(&mut self, offset: i64) -> io::Result<()> {
        match unsafe { (self.skip)(self.user_data, offset) } {
            0 => Ok(()),
            _ => Err(callback_failed("skip")),
        }
    }
}

/// Encode an array into the callback sink.
///
/// # Safety
/// Every non-null pointer must be valid for the sizes given alongside it:
/// `array.data` for `array.len` bytes, `array.shape` (and `array.strides`
/// when set) for `array.ndim` entries, `params.compression_ratios` for
/// `params.ratio_count` entries, and `array.typestr` must be NUL-terminated.
/// The callbacks are invoked with `sink.user_data` on the calling thread only.
#[unsafe(no_mangle)]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub unsafe extern "C" fn j2karray_encode(
    array: *const J2kArrayDesc,
    params: *const J2kEncodeParams,
    sink: *const J2kSinkCallbacks,
) -> c_int {
    if array.is_null() || params.is_null() || sink.is_null() {
        return J2KARRAY_INVALID_ARGUMENT;
    }
    let (array, params, sink) = unsafe { (&*array, &*params, &*sink) };

    if array.data.is_null() || array.typestr.is_null() || array.shape.is_null() {
        return J2KARRAY_INVALID_ARGUMENT;
    }
    if params.ratio_count > 0 && params.compression_ratios.is_null() {
        return J2KARRAY_INVALID_ARGUMENT;
    }
    let (Some(write), Some(seek), Some(skip)) = (sink.write, sink.seek, sink.skip) else {
        return J2KARRAY_INVALID_ARGUMENT;
    };

    let data = unsafe { std::slice::from_raw_parts(array.data, array.len) };
    let shape = unsafe { std::slice::from_raw_parts(array.shape, array.ndim) };
    let Ok(typestr) = unsafe { CStr::from_ptr(array.typestr) }.to_str() else {
        return EncodeError::UnsupportedDType.status_code();
    };
    let ratios = if params.ratio_count == 0 {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(params.compression_ratios, params.ratio_count) }
    };

    let mut source = match SourceBuffer::from_typestr(data, shape, typestr) {
        Ok(source) => source,
        Err(e) => return e.status_code(),
    };
    if !array.strides.is_null() {
        let strides = unsafe { std::slice::from_raw_parts(array.strides, array.ndim) };
        source = source.with_strides(strides);
    }

    let options = match EncodeOptions::from_raw(
        params.bits_stored,
        params.photometric_interpretation,
        params.use_mct,
        params.lossless,
        ratios,
        params.codec_format,
    ) {
        Ok(options) => options,
        Err(e) => return e.status_code(),
    };

    let mut sink = CallbackSink {
        user_data: sink.user_data,
        write,
        seek,
        skip,
    };
    crate::encode_status(&source, &mut sink, &options)
}
