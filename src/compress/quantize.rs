use super::CompressionMode;
use crate::SHORT_NAN_CODE;

/// Maps a float to its 16-bit code under the given scale factor. NaN maps
/// to [`SHORT_NAN_CODE`]; every non-NaN value saturates into
/// `[i16::MIN, i16::MAX - 1]` so the sentinel stays unambiguous.
pub fn quantize(value: f32, scale_factor: f32, mode: CompressionMode) -> i16 {
    if value.is_nan() {
        return SHORT_NAN_CODE;
    }
    let scaled = match mode {
        CompressionMode::Linear => value * scale_factor,
        CompressionMode::LogarithmicLinear => (1.0 + value).log10() * scale_factor,
    };
    let rounded = scaled.round();
    if rounded >= (SHORT_NAN_CODE - 1) as f32 {
        SHORT_NAN_CODE - 1
    } else if rounded <= i16::MIN as f32 {
        i16::MIN
    } else {
        rounded as i16
    }
}

pub fn dequantize(code: i16, scale_factor: f32, mode: CompressionMode) -> f32 {
    if code == SHORT_NAN_CODE {
        return f32::NAN;
    }
    match mode {
        CompressionMode::Linear => code as f32 / scale_factor,
        CompressionMode::LogarithmicLinear => 10_f32.powf(code as f32 / scale_factor) - 1.0,
    }
}
