//! Conversion between planar linear samples and interleaved raw PCM.
//!
//! The frame loops are generic over the codec and take the channel count as a
//! const parameter. Every (encoding, channel count) pair is instantiated once
//! and stored in a dispatch table, so selecting a converter is an index
//! operation and the inner loop has no per-sample branching.

use anyhow::{Result, bail};
use arrayvec::ArrayVec;
use log::{debug, warn};

use crate::process::{Filter, check_input};
use crate::structs::chunk::{Chunk, Planes};
use crate::structs::speakers::{Format, NCHANNELS, Sample, Speakers, check_channels};
use crate::utils::errors::{FilterError, FormatError};
use crate::utils::pcm::{
    Pcm16Be, Pcm16Le, Pcm24Be, Pcm24Le, Pcm32Be, Pcm32Le, PcmCodec, PcmDouble, PcmFloat,
};

/// Largest interleaved frame of any encoding, in bytes.
pub const MAX_FRAME_SIZE: usize = NCHANNELS * 8;

type DecodeFn = fn(&[u8], &mut [&mut [Sample]], usize);
type EncodeFn = fn(&[&[Sample]], &mut [u8], usize);

fn decode_frames<C: PcmCodec, const CH: usize>(
    raw: &[u8],
    channels: &mut [&mut [Sample]],
    frames: usize,
) {
    for (s, frame) in raw.chunks_exact(C::WIDTH * CH).take(frames).enumerate() {
        for ch in 0..CH {
            channels[ch][s] = C::decode(&frame[ch * C::WIDTH..]);
        }
    }
}

fn encode_frames<C: PcmCodec, const CH: usize>(
    channels: &[&[Sample]],
    raw: &mut [u8],
    frames: usize,
) {
    for (s, frame) in raw.chunks_exact_mut(C::WIDTH * CH).take(frames).enumerate() {
        for ch in 0..CH {
            C::encode(channels[ch][s], &mut frame[ch * C::WIDTH..]);
        }
    }
}

macro_rules! dispatch_row {
    ($kernel:ident, $fn_ty:ty, $codec:ty) => {
        [
            $kernel::<$codec, 1> as $fn_ty,
            $kernel::<$codec, 2> as $fn_ty,
            $kernel::<$codec, 3> as $fn_ty,
            $kernel::<$codec, 4> as $fn_ty,
            $kernel::<$codec, 5> as $fn_ty,
            $kernel::<$codec, 6> as $fn_ty,
        ]
    };
}

macro_rules! dispatch_table {
    ($kernel:ident, $fn_ty:ty) => {
        [
            dispatch_row!($kernel, $fn_ty, Pcm16Le),
            dispatch_row!($kernel, $fn_ty, Pcm24Le),
            dispatch_row!($kernel, $fn_ty, Pcm32Le),
            dispatch_row!($kernel, $fn_ty, Pcm16Be),
            dispatch_row!($kernel, $fn_ty, Pcm24Be),
            dispatch_row!($kernel, $fn_ty, Pcm32Be),
            dispatch_row!($kernel, $fn_ty, PcmFloat),
            dispatch_row!($kernel, $fn_ty, PcmDouble),
        ]
    };
}

// Rows follow `Format::pcm_index`, columns the channel count minus one.
static DECODE: [[DecodeFn; NCHANNELS]; 8] = dispatch_table!(decode_frames, DecodeFn);
static ENCODE: [[EncodeFn; NCHANNELS]; 8] = dispatch_table!(encode_frames, EncodeFn);

fn check_buffers(
    format: Format,
    raw_len: usize,
    lengths: impl Iterator<Item = usize>,
    nch: usize,
    frames: usize,
) -> Result<usize> {
    let Some(index) = format.pcm_index() else {
        bail!(FormatError::NotPcm(format));
    };
    check_channels(nch)?;

    let needed = frames
        .saturating_mul(nch)
        .saturating_mul(format.sample_size().unwrap_or(0));
    if raw_len < needed {
        bail!(FormatError::RawBufferTooShort {
            frames,
            needed,
            actual: raw_len,
        });
    }
    for (channel, actual) in lengths.enumerate() {
        if actual < frames {
            bail!(FormatError::ChannelBufferTooShort {
                channel,
                needed: frames,
                actual,
            });
        }
    }
    Ok(index)
}

/// Decodes `frames` interleaved frames of `format` into one buffer per
/// channel. The channel count is `channels.len()`.
pub fn raw_to_linear(
    format: Format,
    raw: &[u8],
    channels: &mut [&mut [Sample]],
    frames: usize,
) -> Result<()> {
    let nch = channels.len();
    let index = check_buffers(format, raw.len(), channels.iter().map(|c| c.len()), nch, frames)?;
    DECODE[index][nch - 1](raw, channels, frames);
    Ok(())
}

/// Encodes `frames` samples of every channel into interleaved `format`.
///
/// Integer encodings round to nearest (ties to even) and saturate.
pub fn linear_to_raw(
    format: Format,
    channels: &[&[Sample]],
    raw: &mut [u8],
    frames: usize,
) -> Result<()> {
    let nch = channels.len();
    let index = check_buffers(format, raw.len(), channels.iter().map(|c| c.len()), nch, frames)?;
    ENCODE[index][nch - 1](channels, raw, frames);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Passthrough,
    ToLinear,
    ToRaw,
}

/// Filter converting between linear and one raw PCM encoding.
///
/// Linear input is encoded to the target format, raw input is decoded to
/// linear (the target must then be [`Format::Linear`]) and input already in
/// the target format passes through untouched. Raw input may split frames
/// across chunks; the incomplete tail is held back and completed from the
/// next chunk.
pub struct Converter {
    target: Format,
    input: Speakers,
    output: Speakers,
    mode: Mode,
    frame_size: usize,

    linear: Vec<Sample>,
    raw: Vec<u8>,
    part: [u8; MAX_FRAME_SIZE],
    part_len: usize,
}

impl Converter {
    pub fn new(target: Format) -> Self {
        Self {
            target,
            input: Speakers::UNKNOWN,
            output: Speakers::UNKNOWN,
            mode: Mode::Passthrough,
            frame_size: 0,
            linear: Vec::new(),
            raw: Vec::new(),
            part: [0; MAX_FRAME_SIZE],
            part_len: 0,
        }
    }

    pub fn target(&self) -> Format {
        self.target
    }

    /// Bytes of an incomplete frame waiting for the next chunk.
    pub fn pending(&self) -> usize {
        self.part_len
    }

    fn drop_partial(&mut self) {
        if self.part_len > 0 {
            warn!(
                "Dropping {} bytes of incomplete {} frame at end of stream",
                self.part_len, self.input.format
            );
            self.part_len = 0;
        }
    }

    fn decode<'a>(&'a mut self, mut bytes: &[u8], eos: bool) -> Result<Chunk<'a>> {
        let format = self.input.format;
        let nch = self.input.nch();
        let fs = self.frame_size;
        let frames = (self.part_len + bytes.len()) / fs;

        if self.linear.len() < frames * nch {
            self.linear.resize(frames * nch, 0.0);
        }
        let mut planes: Planes = if frames > 0 {
            self.linear[..frames * nch]
                .chunks_exact_mut(frames)
                .collect()
        } else {
            Planes::new()
        };

        let mut done = 0;
        if self.part_len > 0 && frames > 0 {
            let need = fs - self.part_len;
            self.part[self.part_len..fs].copy_from_slice(&bytes[..need]);
            let mut first: Planes = planes.iter_mut().map(|p| &mut p[..1]).collect();
            raw_to_linear(format, &self.part[..fs], &mut first, 1)?;
            bytes = &bytes[need..];
            self.part_len = 0;
            done = 1;
        }

        let whole = frames - done;
        if whole > 0 {
            let mut rest: Planes = planes.iter_mut().map(|p| &mut p[done..]).collect();
            raw_to_linear(format, bytes, &mut rest, whole)?;
            bytes = &bytes[whole * fs..];
        }

        self.part[self.part_len..self.part_len + bytes.len()].copy_from_slice(bytes);
        self.part_len += bytes.len();
        if eos && self.part_len > 0 {
            warn!(
                "Dropping {} bytes of incomplete {format} frame at end of stream",
                self.part_len
            );
            self.part_len = 0;
        }

        Ok(Chunk::linear(self.output, planes).with_eos(eos))
    }

    fn encode<'a>(&'a mut self, chunk: &Chunk<'_>) -> Result<Chunk<'a>> {
        let Some(planes) = chunk.planes() else {
            return Ok(Chunk::dummy(self.output).with_eos(chunk.eos));
        };
        let frames = chunk.size();
        let len = frames * self.frame_size;

        if self.raw.len() < len {
            self.raw.resize(len, 0);
        }
        let planes: ArrayVec<&[Sample], NCHANNELS> = planes.iter().map(|p| &**p).collect();
        linear_to_raw(self.target, &planes, &mut self.raw[..len], frames)?;

        Ok(Chunk::raw(self.output, &self.raw[..len]).with_eos(chunk.eos))
    }
}

impl Filter for Converter {
    fn set_input(&mut self, spk: Speakers) -> Result<()> {
        spk.validate()?;

        let (mode, output) = match (spk.format.is_linear(), self.target.is_linear()) {
            _ if spk.format == self.target => (Mode::Passthrough, spk),
            (true, false) => (Mode::ToRaw, spk.with_format(self.target)),
            (false, true) => (Mode::ToLinear, spk.with_format(Format::Linear)),
            _ => bail!(FilterError::UnsupportedConversion {
                from: spk.format,
                to: self.target,
            }),
        };
        let frame_size = match mode {
            Mode::Passthrough => 0,
            Mode::ToLinear => spk.frame_size().unwrap_or(0),
            Mode::ToRaw => output.frame_size().unwrap_or(0),
        };

        debug!("Converter configured: {spk} -> {output}");
        self.input = spk;
        self.output = output;
        self.mode = mode;
        self.frame_size = frame_size;
        self.part_len = 0;
        Ok(())
    }

    fn input(&self) -> Speakers {
        self.input
    }

    fn output(&self) -> Speakers {
        self.output
    }

    fn process<'a>(&'a mut self, chunk: Chunk<'a>) -> Result<Chunk<'a>> {
        check_input(self.input, &chunk)?;

        match self.mode {
            Mode::Passthrough => Ok(chunk),
            Mode::ToLinear => match chunk.bytes() {
                Some(bytes) => self.decode(bytes, chunk.eos),
                None => {
                    if chunk.eos {
                        self.drop_partial();
                    }
                    Ok(Chunk::dummy(self.output).with_eos(chunk.eos))
                }
            },
            Mode::ToRaw => self.encode(&chunk),
        }
    }

    fn reset(&mut self) {
        self.part_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::chunk::ChunkData;
    use crate::structs::speakers::{MODE_3_2, MODE_STEREO};

    const PCM16_STEREO: Speakers = Speakers::new(Format::Pcm16, MODE_STEREO, 48000);

    fn decode_all(converter: &mut Converter, pieces: &[&[u8]]) -> Vec<Vec<Sample>> {
        let nch = converter.input().nch();
        let mut out = vec![Vec::new(); nch];
        for (i, piece) in pieces.iter().enumerate() {
            let eos = i + 1 == pieces.len();
            let chunk = Chunk::raw(converter.input(), piece).with_eos(eos);
            let chunk = converter.process(chunk).unwrap();
            assert_eq!(chunk.eos, eos);
            if let Some(planes) = chunk.planes() {
                for (ch, plane) in planes.iter().enumerate() {
                    out[ch].extend_from_slice(plane);
                }
            }
        }
        out
    }

    #[test]
    fn stereo_pcm16_end_to_end() {
        let bytes = [0x00, 0x00, 0xFF, 0x7F];
        let mut left = [0.0];
        let mut right = [0.0];
        raw_to_linear(Format::Pcm16, &bytes, &mut [&mut left[..], &mut right[..]], 1).unwrap();
        assert_eq!(left[0], 0.0);
        assert_eq!(right[0], 32767.0 / 32768.0);

        let mut raw = [0u8; 4];
        linear_to_raw(Format::Pcm16, &[&left[..], &right[..]], &mut raw, 1).unwrap();
        assert_eq!(raw, bytes);
    }

    /// Multiples of 1/16, exact in every encoding.
    fn grid_signal(nch: usize, frames: usize) -> Vec<Vec<Sample>> {
        (0..nch)
            .map(|ch| {
                (0..frames)
                    .map(|s| ((ch * 7 + s * 13) % 29) as Sample / 16.0 - 0.875)
                    .collect()
            })
            .collect()
    }

    fn encode_decode(format: Format, input: &[Vec<Sample>]) -> (Vec<u8>, Vec<Vec<Sample>>) {
        let (nch, frames) = (input.len(), input[0].len());
        let size = format.sample_size().unwrap();
        let refs: Vec<&[Sample]> = input.iter().map(|c| c.as_slice()).collect();
        let mut raw = vec![0u8; frames * nch * size];
        linear_to_raw(format, &refs, &mut raw, frames).unwrap();

        let mut decoded = vec![vec![0.0; frames]; nch];
        let mut outs: Vec<&mut [Sample]> = decoded.iter_mut().map(|c| c.as_mut_slice()).collect();
        raw_to_linear(format, &raw, &mut outs, frames).unwrap();
        (raw, decoded)
    }

    #[test]
    fn every_table_cell_round_trips() {
        for format in Format::PCM {
            for nch in 1..=NCHANNELS {
                let input = grid_signal(nch, 5);
                let (raw, decoded) = encode_decode(format, &input);
                assert_eq!(decoded, input, "{format} x {nch}");

                let (again, _) = encode_decode(format, &decoded);
                assert_eq!(again, raw, "{format} x {nch}");
            }
        }
    }

    #[test]
    fn every_table_cell_saturates() {
        for format in Format::PCM {
            let bits = format.sample_size().unwrap() * 8;
            let max = 1.0 - 1.0 / (1u64 << (bits - 1)) as Sample;
            for nch in 1..=NCHANNELS {
                let input: Vec<Vec<Sample>> = (0..nch)
                    .map(|ch| {
                        let sign = if ch % 2 == 0 { 1.0 } else { -1.0 };
                        vec![1.5 * sign, -4.0 * sign, 0.5]
                    })
                    .collect();
                let (_, decoded) = encode_decode(format, &input);
                for (plane, expected) in decoded.iter().zip(&input) {
                    for (&value, &x) in plane.iter().zip(expected) {
                        let clamped = if format.is_float() || x.abs() < 1.0 {
                            x
                        } else if x > 0.0 {
                            max
                        } else {
                            -1.0
                        };
                        assert_eq!(value, clamped, "{format} x {nch}");
                    }
                }
            }
        }
    }

    #[test]
    fn interleaving_order() {
        let l = [0.5, -0.5];
        let c = [0.25, 0.0];
        let r = [-1.0, 1.0];
        let mut raw = [0u8; 12];
        linear_to_raw(Format::Pcm16Be, &[&l[..], &c[..], &r[..]], &mut raw, 2).unwrap();
        assert_eq!(
            raw,
            [0x40, 0x00, 0x20, 0x00, 0x80, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x7F, 0xFF]
        );
    }

    #[test]
    fn saturation() {
        let samples = [1.5, -1.5, 1.0];
        let mut raw = [0u8; 9];
        linear_to_raw(Format::Pcm24, &[&samples[..]], &mut raw, 3).unwrap();
        assert_eq!(raw, [0xFF, 0xFF, 0x7F, 0x00, 0x00, 0x80, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn entry_points_validate_arguments() {
        let mut raw = [0u8; 4];
        let samples = [0.0; 2];

        let err = linear_to_raw(Format::Linear, &[&samples[..]], &mut raw, 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::NotPcm(Format::Linear))
        );

        let err = linear_to_raw(Format::Pcm16, &[], &mut raw, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::ChannelCount { actual: 0, .. })
        ));

        let seven: Vec<&[Sample]> = vec![&samples[..]; 7];
        assert!(linear_to_raw(Format::Pcm16, &seven, &mut raw, 1).is_err());

        let err = linear_to_raw(Format::Pcm32, &[&samples[..]], &mut raw, 2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::RawBufferTooShort { needed: 8, .. })
        ));

        let err = linear_to_raw(Format::Pcm16, &[&samples[..]], &mut raw, 3).unwrap_err();
        assert!(err.downcast_ref::<FormatError>().is_some());
    }

    #[test]
    fn converter_modes() {
        let mut to_linear = Converter::new(Format::Linear);
        to_linear.set_input(PCM16_STEREO).unwrap();
        assert_eq!(to_linear.output(), PCM16_STEREO.with_format(Format::Linear));

        let mut to_raw = Converter::new(Format::PcmFloat);
        to_raw
            .set_input(PCM16_STEREO.with_format(Format::Linear))
            .unwrap();
        assert_eq!(to_raw.output(), PCM16_STEREO.with_format(Format::PcmFloat));

        let mut same = Converter::new(Format::Pcm16);
        same.set_input(PCM16_STEREO).unwrap();
        let bytes = [1u8, 2, 3, 4];
        let chunk = same.process(Chunk::raw(PCM16_STEREO, &bytes)).unwrap();
        assert_eq!(chunk.bytes(), Some(&bytes[..]));

        let mut pcm_to_pcm = Converter::new(Format::Pcm24);
        let err = pcm_to_pcm.set_input(PCM16_STEREO).unwrap_err();
        assert!(err.downcast_ref::<FilterError>().is_some());
        assert_eq!(pcm_to_pcm.input(), Speakers::UNKNOWN);
    }

    #[test]
    fn split_frames_are_reassembled() {
        let spk = Speakers::new(Format::Pcm24, MODE_3_2, 48000);
        let frame_size = 15;
        let data: Vec<u8> = (0..frame_size * 7).map(|i| (i * 37 % 251) as u8).collect();

        let mut converter = Converter::new(Format::Linear);
        converter.set_input(spk).unwrap();
        let reference = decode_all(&mut converter, &[&data[..]]);
        assert_eq!(reference[0].len(), 7);

        for split in [1, 7, 14, 15, 16, 44, 100] {
            let (a, b) = data.split_at(split);
            let (b, c) = b.split_at(3.min(b.len()));
            let mut converter = Converter::new(Format::Linear);
            converter.set_input(spk).unwrap();
            assert_eq!(decode_all(&mut converter, &[a, b, c]), reference);
        }
    }

    #[test]
    fn dangling_partial_frame_is_dropped_at_eos() {
        let mut converter = Converter::new(Format::Linear);
        converter.set_input(PCM16_STEREO).unwrap();

        let bytes = [0u8, 0, 0, 0, 1, 2];
        {
            let chunk = converter.process(Chunk::raw(PCM16_STEREO, &bytes)).unwrap();
            assert_eq!(chunk.size(), 1);
        }
        assert_eq!(converter.pending(), 2);

        {
            let chunk = converter
                .process(Chunk::raw(PCM16_STEREO, &[3]).with_eos(true))
                .unwrap();
            assert!(chunk.is_dummy());
            assert!(chunk.eos);
        }
        assert_eq!(converter.pending(), 0);
    }

    #[test]
    fn payload_shape_is_checked() {
        let spk = PCM16_STEREO.with_format(Format::Linear);
        let mut to_raw = Converter::new(Format::Pcm16);
        to_raw.set_input(spk).unwrap();
        let mut mono = [0.5, 0.5];
        let err = to_raw
            .process(Chunk::linear(spk, [&mut mono[..]]))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::PlaneCount { spk, planes: 1 })
        );

        let mut to_linear = Converter::new(Format::Linear);
        to_linear.set_input(PCM16_STEREO).unwrap();
        let mut l = [0.5];
        let mut r = [0.5];
        let err = to_linear
            .process(Chunk::linear(PCM16_STEREO, [&mut l[..], &mut r[..]]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::DataKind { found: "linear", .. })
        ));

        let mut passthrough = Converter::new(Format::Linear);
        passthrough.set_input(spk).unwrap();
        let err = passthrough
            .process(Chunk::raw(spk, &[1, 2, 3, 4]))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::DataKind { found: "raw", .. })
        ));
    }

    #[test]
    fn format_mismatch_is_rejected() {
        let mut converter = Converter::new(Format::Linear);
        let err = converter
            .process(Chunk::raw(PCM16_STEREO, &[0, 0, 0, 0]))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FilterError>(),
            Some(&FilterError::NotConfigured)
        );

        converter.set_input(PCM16_STEREO).unwrap();
        let other = PCM16_STEREO.with_format(Format::Pcm32);
        assert!(converter.process(Chunk::raw(other, &[0; 8])).is_err());
    }

    #[test]
    fn linear_to_raw_filter() {
        let spk = PCM16_STEREO.with_format(Format::Linear);
        let mut converter = Converter::new(Format::Pcm16);
        converter.set_input(spk).unwrap();

        let mut l = [0.0, 0.5];
        let mut r = [32767.0 / 32768.0, -1.0];
        let chunk = Chunk::linear(spk, [&mut l[..], &mut r[..]]);
        let out = converter.process(chunk).unwrap();
        assert!(matches!(out.data, ChunkData::Raw(_)));
        assert_eq!(
            out.bytes(),
            Some(&[0x00, 0x00, 0xFF, 0x7F, 0x00, 0x40, 0x00, 0x80][..])
        );
    }
}
