//! Safe wrappers around FFmpeg FFI calls.
//!
//! Every function in this module is `pub` and **safe** to call. All `unsafe`
//! blocks are contained here. The engine itself never needs to write `unsafe`
//! for descriptor fields or seeking.

use bytes::Bytes;
use ffmpeg_next as ffmpeg;
use std::ffi::CStr;
use std::os::raw::c_char;

use ffmpeg::codec::parameters::Parameters;
use ffmpeg::ffi;

/// Copy a nullable C string into an owned `String`, empty when null.
fn owned_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: FFmpeg name lookups return pointers to static, NUL-terminated
    // strings. Null was handled above.
    unsafe { CStr::from_ptr(ptr).to_string_lossy().into_owned() }
}

// ── Codec-parameter field accessors ─────────────────────────────────────────

/// Read `sample_rate` from an `AVCodecParameters` struct.
///
/// `ffmpeg-next` does not expose this field through a safe accessor.
pub fn codec_params_sample_rate(params: &Parameters) -> u32 {
    // SAFETY: `params.as_ptr()` is valid and non-null for the lifetime of
    // `params`. `sample_rate` is a plain i32 field.
    unsafe { (*params.as_ptr()).sample_rate.max(0) as u32 }
}

/// Read `ch_layout.nb_channels` from an `AVCodecParameters` struct.
pub fn codec_params_channels(params: &Parameters) -> u32 {
    unsafe { (*params.as_ptr()).ch_layout.nb_channels.max(0) as u32 }
}

pub fn codec_params_width(params: &Parameters) -> u32 {
    unsafe { (*params.as_ptr()).width.max(0) as u32 }
}

pub fn codec_params_height(params: &Parameters) -> u32 {
    unsafe { (*params.as_ptr()).height.max(0) as u32 }
}

pub fn codec_params_profile(params: &Parameters) -> i32 {
    unsafe { (*params.as_ptr()).profile }
}

pub fn codec_params_level(params: &Parameters) -> i32 {
    unsafe { (*params.as_ptr()).level }
}

pub fn codec_params_bit_rate(params: &Parameters) -> u64 {
    unsafe { (*params.as_ptr()).bit_rate.max(0) as u64 }
}

/// Codec-private setup bytes (avcC, hvcC, AudioSpecificConfig...), copied out.
pub fn codec_params_extradata(params: &Parameters) -> Bytes {
    // SAFETY: `extradata` is either null or points at `extradata_size` bytes
    // owned by the parameters, which outlive this call. We copy before return.
    unsafe {
        let par = params.as_ptr();
        let size = (*par).extradata_size;
        if (*par).extradata.is_null() || size <= 0 {
            return Bytes::new();
        }
        Bytes::copy_from_slice(std::slice::from_raw_parts((*par).extradata, size as usize))
    }
}

/// Human readable profile name ("High", "LC", ...), empty when unknown.
pub fn codec_params_profile_name(params: &Parameters) -> String {
    // SAFETY: `avcodec_profile_name` only reads the static codec descriptor
    // table and returns a static string or null.
    let ptr = unsafe {
        let par = params.as_ptr();
        ffi::avcodec_profile_name((*par).codec_id, (*par).profile)
    };
    owned_str(ptr)
}

/// Color description names of a video stream.
#[derive(Debug, Clone, Default)]
pub struct ColorNames {
    pub primaries: String,
    pub transfer: String,
    pub space: String,
    pub range: String,
}

pub fn codec_params_color_names(params: &Parameters) -> ColorNames {
    // SAFETY: the `av_color_*_name` functions look values up in static tables
    // and return null for out-of-range values.
    unsafe {
        let par = params.as_ptr();
        ColorNames {
            primaries: owned_str(ffi::av_color_primaries_name((*par).color_primaries)),
            transfer: owned_str(ffi::av_color_transfer_name((*par).color_trc)),
            space: owned_str(ffi::av_color_space_name((*par).color_space)),
            range: owned_str(ffi::av_color_range_name((*par).color_range)),
        }
    }
}

/// Rotation from the display matrix in the coded side data, if present.
///
/// Returned as the clockwise angle in degrees, not yet normalized.
pub fn codec_params_display_rotation(params: &Parameters) -> Option<f64> {
    // SAFETY: `coded_side_data` holds `nb_coded_side_data` entries owned by the
    // parameters. A display matrix is 9 i32 values, checked via `size`.
    unsafe {
        let par = params.as_ptr();
        let side = (*par).coded_side_data;
        if side.is_null() {
            return None;
        }
        for i in 0..(*par).nb_coded_side_data.max(0) as usize {
            let sd = &*side.add(i);
            if matches!(
                sd.type_,
                ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX
            ) && sd.size >= 9 * 4
            {
                let theta = -ffi::av_display_rotation_get(sd.data as *const i32);
                return Some(if theta.is_nan() { 0.0 } else { theta });
            }
        }
        None
    }
}

// ── Stream / format context helpers ─────────────────────────────────────────

/// Sample and display aspect ratios as `(num, den)` pairs, when known.
pub fn guess_aspect_ratios(
    input: &ffmpeg::format::context::Input,
    stream: &ffmpeg::Stream<'_>,
    width: u32,
    height: u32,
) -> Option<((i32, i32), (i32, i32))> {
    // SAFETY: both pointers are valid for the lifetime of `input`. The guess
    // only reads the contexts; a null frame is explicitly allowed.
    let sar = unsafe {
        ffi::av_guess_sample_aspect_ratio(
            input.as_ptr() as *mut _,
            stream.as_ptr() as *mut _,
            std::ptr::null_mut(),
        )
    };
    if sar.num == 0 || sar.den == 0 {
        return None;
    }

    let (mut dar_num, mut dar_den) = (0i32, 0i32);
    // SAFETY: out-pointers reference live locals.
    unsafe {
        ffi::av_reduce(
            &mut dar_num,
            &mut dar_den,
            width as i64 * sar.num as i64,
            height as i64 * sar.den as i64,
            1024 * 1024,
        );
    }
    Some(((sar.num, sar.den), (dar_num, dar_den)))
}

/// `(start_time, flags)` of the format context, start time in AV_TIME_BASE units.
pub fn format_start_and_flags(input: &ffmpeg::format::context::Input) -> (i64, i32) {
    // SAFETY: `input.as_ptr()` is valid for the lifetime of `input`.
    unsafe {
        let ctx = input.as_ptr();
        ((*ctx).start_time, (*ctx).flags)
    }
}

/// Index of the best stream of `medium`, honoring `wanted` when given.
///
/// Returns the negative FFmpeg error code on failure.
pub fn find_best_stream(
    input: &ffmpeg::format::context::Input,
    medium: ffmpeg::media::Type,
    wanted: Option<usize>,
) -> Result<usize, i32> {
    let wanted = wanted.map_or(-1, |i| i as i32);
    // SAFETY: the context is valid and only read; no decoder is requested.
    let ret = unsafe {
        ffi::av_find_best_stream(
            input.as_ptr() as *mut _,
            medium.into(),
            wanted,
            -1,
            std::ptr::null_mut(),
            0,
        )
    };
    if ret < 0 {
        Err(ret)
    } else {
        Ok(ret as usize)
    }
}

/// Seek `stream_index` to `timestamp` expressed in that stream's time base.
pub fn seek_frame(
    input: &mut ffmpeg::format::context::Input,
    stream_index: usize,
    timestamp: i64,
    flags: i32,
) -> Result<(), i32> {
    // SAFETY: `input.as_mut_ptr()` is valid and uniquely borrowed.
    let ret = unsafe {
        ffi::av_seek_frame(input.as_mut_ptr(), stream_index as i32, timestamp, flags)
    };
    if ret < 0 {
        Err(ret)
    } else {
        Ok(())
    }
}

/// Convert timestamps from one timebase to another
pub fn rescale_ts(ts: i64, from: ffmpeg::Rational, to: ffmpeg::Rational) -> i64 {
    unsafe { ffi::av_rescale_q(ts, from.into(), to.into()) }
}

/// Set the global FFmpeg log level.
pub fn set_log_level(code: i32) {
    // SAFETY: writes a global integer.
    unsafe { ffi::av_log_set_level(code) }
}
