//! Per-sample PCM codecs.
//!
//! Each raw encoding is a zero-sized type implementing [`PcmCodec`]. The
//! conversion engine instantiates its generic frame loops over these types,
//! so the per-sample work below is inlined into branch-free loops.
//!
//! Integer encodings map full scale to 1.0: a sample `v` of width `b` bits
//! decodes to `v / 2^(b-1)`. Encoding rounds to nearest with ties to even and
//! saturates to the representable range. Float encodings are plain casts.

use crate::structs::speakers::{Format, Sample};

pub const SCALE_16: Sample = 32768.0;
pub const SCALE_24: Sample = 8388608.0;
pub const SCALE_32: Sample = 2147483648.0;

/// Decoding and encoding of one channel sample.
pub trait PcmCodec {
    const FORMAT: Format;
    /// Bytes per sample.
    const WIDTH: usize;

    /// Decodes `bytes[..WIDTH]`.
    fn decode(bytes: &[u8]) -> Sample;

    /// Encodes into `out[..WIDTH]`.
    fn encode(sample: Sample, out: &mut [u8]);
}

#[inline(always)]
fn quantize(sample: Sample, scale: Sample, min: Sample, max: Sample) -> Sample {
    (sample * scale).round_ties_even().clamp(min, max)
}

macro_rules! int_codec {
    ($name:ident, $format:expr, $t:ty, $scale:expr, $from:ident, $to:ident) => {
        pub struct $name;

        impl PcmCodec for $name {
            const FORMAT: Format = $format;
            const WIDTH: usize = std::mem::size_of::<$t>();

            #[inline(always)]
            fn decode(bytes: &[u8]) -> Sample {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..Self::WIDTH]);
                <$t>::$from(raw) as Sample / $scale
            }

            #[inline(always)]
            fn encode(sample: Sample, out: &mut [u8]) {
                let value = quantize(sample, $scale, <$t>::MIN as Sample, <$t>::MAX as Sample);
                out[..Self::WIDTH].copy_from_slice(&(value as $t).$to());
            }
        }
    };
}

int_codec!(Pcm16Le, Format::Pcm16, i16, SCALE_16, from_le_bytes, to_le_bytes);
int_codec!(Pcm16Be, Format::Pcm16Be, i16, SCALE_16, from_be_bytes, to_be_bytes);
int_codec!(Pcm32Le, Format::Pcm32, i32, SCALE_32, from_le_bytes, to_le_bytes);
int_codec!(Pcm32Be, Format::Pcm32Be, i32, SCALE_32, from_be_bytes, to_be_bytes);

const I24_MIN: Sample = -8388608.0;
const I24_MAX: Sample = 8388607.0;

pub struct Pcm24Le;

impl PcmCodec for Pcm24Le {
    const FORMAT: Format = Format::Pcm24;
    const WIDTH: usize = 3;

    #[inline(always)]
    fn decode(bytes: &[u8]) -> Sample {
        // Shift the 24-bit value to the top of an i32 and back to sign-extend.
        (i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8) as Sample / SCALE_24
    }

    #[inline(always)]
    fn encode(sample: Sample, out: &mut [u8]) {
        let value = quantize(sample, SCALE_24, I24_MIN, I24_MAX) as i32;
        out[..3].copy_from_slice(&value.to_le_bytes()[..3]);
    }
}

pub struct Pcm24Be;

impl PcmCodec for Pcm24Be {
    const FORMAT: Format = Format::Pcm24Be;
    const WIDTH: usize = 3;

    #[inline(always)]
    fn decode(bytes: &[u8]) -> Sample {
        (i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8) as Sample / SCALE_24
    }

    #[inline(always)]
    fn encode(sample: Sample, out: &mut [u8]) {
        let value = quantize(sample, SCALE_24, I24_MIN, I24_MAX) as i32;
        out[..3].copy_from_slice(&value.to_be_bytes()[1..]);
    }
}

pub struct PcmFloat;

impl PcmCodec for PcmFloat {
    const FORMAT: Format = Format::PcmFloat;
    const WIDTH: usize = 4;

    #[inline(always)]
    fn decode(bytes: &[u8]) -> Sample {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as Sample
    }

    #[inline(always)]
    fn encode(sample: Sample, out: &mut [u8]) {
        out[..4].copy_from_slice(&(sample as f32).to_le_bytes());
    }
}

pub struct PcmDouble;

impl PcmCodec for PcmDouble {
    const FORMAT: Format = Format::PcmDouble;
    const WIDTH: usize = 8;

    #[inline(always)]
    fn decode(bytes: &[u8]) -> Sample {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_le_bytes(raw)
    }

    #[inline(always)]
    fn encode(sample: Sample, out: &mut [u8]) {
        out[..8].copy_from_slice(&sample.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded<C: PcmCodec>(sample: Sample) -> Vec<u8> {
        let mut out = vec![0u8; C::WIDTH];
        C::encode(sample, &mut out);
        out
    }

    #[test]
    fn sign_extension() {
        assert_eq!(Pcm16Le::decode(&[0x00, 0x80]), -1.0);
        assert_eq!(Pcm16Be::decode(&[0xFF, 0xFF]), -1.0 / SCALE_16);
        assert_eq!(Pcm24Le::decode(&[0x00, 0x00, 0x80]), -1.0);
        assert_eq!(Pcm24Le::decode(&[0xFF, 0xFF, 0xFF]), -1.0 / SCALE_24);
        assert_eq!(Pcm24Be::decode(&[0x80, 0x00, 0x00]), -1.0);
        assert_eq!(Pcm24Be::decode(&[0x7F, 0xFF, 0xFF]), 8388607.0 / SCALE_24);
        assert_eq!(Pcm32Be::decode(&[0x80, 0, 0, 0]), -1.0);
        assert_eq!(Pcm32Le::decode(&[0xFF, 0xFF, 0xFF, 0xFF]), -1.0 / SCALE_32);
    }

    #[test]
    fn byte_order() {
        assert_eq!(encoded::<Pcm16Le>(0.5), vec![0x00, 0x40]);
        assert_eq!(encoded::<Pcm16Be>(0.5), vec![0x40, 0x00]);
        assert_eq!(encoded::<Pcm24Le>(-0.5), vec![0x00, 0x00, 0xC0]);
        assert_eq!(encoded::<Pcm24Be>(-0.5), vec![0xC0, 0x00, 0x00]);
        assert_eq!(encoded::<Pcm32Be>(0.25), vec![0x20, 0, 0, 0]);
        assert_eq!(encoded::<PcmFloat>(1.5), 1.5f32.to_le_bytes().to_vec());
    }

    #[test]
    fn rounds_to_nearest_even() {
        let lsb = 1.0 / SCALE_16;
        assert_eq!(encoded::<Pcm16Le>(0.4 * lsb), vec![0, 0]);
        assert_eq!(encoded::<Pcm16Le>(0.6 * lsb), vec![1, 0]);
        assert_eq!(encoded::<Pcm16Le>(0.5 * lsb), vec![0, 0]);
        assert_eq!(encoded::<Pcm16Le>(1.5 * lsb), vec![2, 0]);
        assert_eq!(encoded::<Pcm16Le>(-0.6 * lsb), vec![0xFF, 0xFF]);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        assert_eq!(encoded::<Pcm16Le>(1.0), vec![0xFF, 0x7F]);
        assert_eq!(encoded::<Pcm16Le>(-3.0), vec![0x00, 0x80]);
        assert_eq!(encoded::<Pcm24Le>(2.0), vec![0xFF, 0xFF, 0x7F]);
        assert_eq!(encoded::<Pcm24Be>(-2.0), vec![0x80, 0x00, 0x00]);
        assert_eq!(encoded::<Pcm32Le>(1.0), vec![0xFF, 0xFF, 0xFF, 0x7F]);
        assert_eq!(encoded::<Pcm32Be>(-1e9), vec![0x80, 0, 0, 0]);
    }

    #[test]
    fn float_targets_do_not_saturate() {
        assert_eq!(PcmFloat::decode(&encoded::<PcmFloat>(4.0)), 4.0);
        assert_eq!(PcmDouble::decode(&encoded::<PcmDouble>(-12.25)), -12.25);
    }
}
