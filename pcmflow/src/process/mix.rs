//! Matrix mixing of planar linear channels.
//!
//! Output channel `j` of frame `s` is `Σ_i in[i][s] * matrix[i][j]`, summed in
//! ascending input order starting with channel 0. Kernels are instantiated for
//! every (input, output) channel count pair and selected from dispatch tables.
//!
//! In-place mixing writes the outputs back into the first `nout` input
//! buffers. Each frame is mixed into a local array before write-back, so it is
//! only defined when there are no more outputs than inputs; the in-place table
//! has no entries above the diagonal.

use anyhow::{Result, bail};
use arrayvec::ArrayVec;
use log::debug;

use crate::process::{Filter, check_input};
use crate::structs::chunk::{Chunk, Planes};
use crate::structs::matrix::{Matrix, MixLevels};
use crate::structs::speakers::{NCHANNELS, Sample, Speakers, check_channels};
use crate::utils::errors::{FilterError, FormatError};

type MixFn = fn(&Matrix, &[&[Sample]], &mut [&mut [Sample]], usize);
type MixInPlaceFn = fn(&Matrix, &mut [&mut [Sample]], usize);

fn mix_frames<const NI: usize, const NO: usize>(
    m: &Matrix,
    input: &[&[Sample]],
    output: &mut [&mut [Sample]],
    frames: usize,
) {
    for s in 0..frames {
        for j in 0..NO {
            let mut acc = input[0][s] * m[0][j];
            for i in 1..NI {
                acc += input[i][s] * m[i][j];
            }
            output[j][s] = acc;
        }
    }
}

fn mix_frames_in_place<const NI: usize, const NO: usize>(
    m: &Matrix,
    channels: &mut [&mut [Sample]],
    frames: usize,
) {
    for s in 0..frames {
        let mut out = [0.0; NO];
        for (j, value) in out.iter_mut().enumerate() {
            let mut acc = channels[0][s] * m[0][j];
            for i in 1..NI {
                acc += channels[i][s] * m[i][j];
            }
            *value = acc;
        }
        for (j, value) in out.into_iter().enumerate() {
            channels[j][s] = value;
        }
    }
}

macro_rules! mix_row {
    ($ni:literal) => {
        [
            mix_frames::<$ni, 1> as MixFn,
            mix_frames::<$ni, 2> as MixFn,
            mix_frames::<$ni, 3> as MixFn,
            mix_frames::<$ni, 4> as MixFn,
            mix_frames::<$ni, 5> as MixFn,
            mix_frames::<$ni, 6> as MixFn,
        ]
    };
}

macro_rules! ip {
    ($ni:literal, $no:literal) => {
        Some(mix_frames_in_place::<$ni, $no> as MixInPlaceFn)
    };
}

// Indexed by [input channels - 1][output channels - 1].
static MIX: [[MixFn; NCHANNELS]; NCHANNELS] = [
    mix_row!(1),
    mix_row!(2),
    mix_row!(3),
    mix_row!(4),
    mix_row!(5),
    mix_row!(6),
];

#[rustfmt::skip]
static MIX_IN_PLACE: [[Option<MixInPlaceFn>; NCHANNELS]; NCHANNELS] = [
    [ip!(1, 1), None,      None,      None,      None,      None],
    [ip!(2, 1), ip!(2, 2), None,      None,      None,      None],
    [ip!(3, 1), ip!(3, 2), ip!(3, 3), None,      None,      None],
    [ip!(4, 1), ip!(4, 2), ip!(4, 3), ip!(4, 4), None,      None],
    [ip!(5, 1), ip!(5, 2), ip!(5, 3), ip!(5, 4), ip!(5, 5), None],
    [ip!(6, 1), ip!(6, 2), ip!(6, 3), ip!(6, 4), ip!(6, 5), ip!(6, 6)],
];

fn check_lengths(lengths: impl Iterator<Item = usize>, frames: usize) -> Result<()> {
    for (channel, actual) in lengths.enumerate() {
        if actual < frames {
            bail!(FormatError::ChannelBufferTooShort {
                channel,
                needed: frames,
                actual,
            });
        }
    }
    Ok(())
}

/// Mixes `input` into `output`. Channel counts are the slice lengths and are
/// independent of each other.
pub fn mix(
    matrix: &Matrix,
    input: &[&[Sample]],
    output: &mut [&mut [Sample]],
    frames: usize,
) -> Result<()> {
    let (nin, nout) = (input.len(), output.len());
    check_channels(nin)?;
    check_channels(nout)?;
    check_lengths(input.iter().map(|c| c.len()), frames)?;
    check_lengths(output.iter().map(|c| c.len()), frames)?;

    MIX[nin - 1][nout - 1](matrix, input, output, frames);
    Ok(())
}

/// Mixes `channels` in place, leaving the result in the first `nout` buffers.
///
/// Fails with [`FilterError::InPlaceExpansion`] when `nout` exceeds the number
/// of input channels.
pub fn mix_in_place(
    matrix: &Matrix,
    channels: &mut [&mut [Sample]],
    nout: usize,
    frames: usize,
) -> Result<()> {
    let nin = channels.len();
    check_channels(nin)?;
    check_channels(nout)?;
    check_lengths(channels.iter().map(|c| c.len()), frames)?;

    let Some(kernel) = MIX_IN_PLACE[nin - 1][nout - 1] else {
        bail!(FilterError::InPlaceExpansion {
            inputs: nin,
            outputs: nout,
        });
    };
    kernel(matrix, channels, frames);
    Ok(())
}

/// Filter remapping linear channels to another layout.
///
/// The matrix is calculated from [`MixLevels`] for the current input and
/// output layouts unless one was set explicitly with [`Mixer::set_matrix`].
pub struct Mixer {
    out_mask: u32,
    levels: MixLevels,
    matrix: Matrix,
    auto_matrix: bool,

    input: Speakers,
    output: Speakers,
    passthrough: bool,
    buf: Vec<Sample>,
}

impl Mixer {
    pub fn new(out_mask: u32) -> Self {
        Self {
            out_mask,
            levels: MixLevels::default(),
            matrix: Matrix::identity(),
            auto_matrix: true,
            input: Speakers::UNKNOWN,
            output: Speakers::UNKNOWN,
            passthrough: false,
            buf: Vec::new(),
        }
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn levels(&self) -> &MixLevels {
        &self.levels
    }

    pub fn out_mask(&self) -> u32 {
        self.out_mask
    }

    /// Uses `matrix` as is, disabling automatic calculation.
    pub fn set_matrix(&mut self, matrix: Matrix) {
        self.matrix = matrix;
        self.auto_matrix = false;
        self.update_passthrough();
    }

    /// Switches back to automatic calculation with the given levels.
    pub fn set_levels(&mut self, levels: MixLevels) {
        self.levels = levels;
        self.auto_matrix = true;
        self.calc_matrix();
    }

    pub fn with_levels(mut self, levels: MixLevels) -> Self {
        self.set_levels(levels);
        self
    }

    /// Changes the output layout. Takes effect immediately when configured.
    pub fn set_output(&mut self, out_mask: u32) -> Result<()> {
        if self.input != Speakers::UNKNOWN {
            Self::check_output(self.input.with_mask(out_mask))?;
            self.output = self.input.with_mask(out_mask);
        }
        self.out_mask = out_mask;
        self.calc_matrix();
        Ok(())
    }

    fn check_output(output: Speakers) -> Result<()> {
        if output.validate().is_err() {
            bail!(FilterError::InvalidOutputMask(output.mask));
        }
        Ok(())
    }

    fn calc_matrix(&mut self) {
        if self.auto_matrix && self.input != Speakers::UNKNOWN {
            self.matrix = Matrix::downmix(self.input.mask, self.out_mask, &self.levels);
            debug!(
                "Mixer matrix recalculated for {} -> {}",
                self.input.mode_name(),
                self.output.mode_name()
            );
        }
        self.update_passthrough();
    }

    fn update_passthrough(&mut self) {
        let n = self.input.nch();
        self.passthrough = self.input.mask == self.out_mask
            && (0..n).all(|i| (0..n).all(|j| self.matrix[i][j] == if i == j { 1.0 } else { 0.0 }));
    }
}

impl Filter for Mixer {
    fn set_input(&mut self, spk: Speakers) -> Result<()> {
        if !spk.format.is_linear() {
            bail!(FilterError::UnsupportedInput(spk));
        }
        spk.validate()?;
        let output = spk.with_mask(self.out_mask);
        Self::check_output(output)?;

        self.input = spk;
        self.output = output;
        self.calc_matrix();
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
        if self.passthrough {
            return Ok(chunk);
        }

        let frames = chunk.size();
        let output = self.output;
        let eos = chunk.eos;
        if frames == 0 {
            return Ok(Chunk::dummy(output).with_eos(eos));
        }
        let Some((_, _, mut planes)) = chunk.into_planes() else {
            return Ok(Chunk::dummy(output).with_eos(eos));
        };
        let (nin, nout) = (planes.len(), output.nch());

        if nout <= nin {
            mix_in_place(&self.matrix, &mut planes, nout, frames)?;
            planes.truncate(nout);
            return Ok(Chunk::linear(output, planes).with_eos(eos));
        }

        if self.buf.len() < nout * frames {
            self.buf.resize(nout * frames, 0.0);
        }
        let input: ArrayVec<&[Sample], NCHANNELS> = planes.iter().map(|p| &**p).collect();
        let mut out: Planes = self.buf[..nout * frames]
            .chunks_exact_mut(frames)
            .collect();
        mix(&self.matrix, &input, &mut out, frames)?;
        Ok(Chunk::linear(output, out).with_eos(eos))
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::speakers::{Format, MODE_3_2, MODE_5_1, MODE_MONO, MODE_STEREO};

    fn linear(mask: u32) -> Speakers {
        Speakers::new(Format::Linear, mask, 48000)
    }

    fn test_matrix() -> Matrix {
        let mut m = Matrix::zero();
        for i in 0..NCHANNELS {
            for j in 0..NCHANNELS {
                m[i][j] = (i * NCHANNELS + j) as Sample / 10.0 - 1.5;
            }
        }
        m
    }

    fn test_signal(nch: usize, frames: usize) -> Vec<Vec<Sample>> {
        (0..nch)
            .map(|ch| {
                (0..frames)
                    .map(|s| ((ch * 31 + s * 7) % 17) as Sample / 8.0 - 1.0)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn identity_reproduces_input() {
        let input = test_signal(5, 16);
        let refs: Vec<&[Sample]> = input.iter().map(|c| c.as_slice()).collect();
        let mut output = vec![vec![0.0; 16]; 5];
        let mut outs: Vec<&mut [Sample]> = output.iter_mut().map(|c| c.as_mut_slice()).collect();
        mix(&Matrix::identity(), &refs, &mut outs, 16).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn every_out_of_place_cell_sums_in_order() {
        let m = test_matrix();
        for nin in 1..=NCHANNELS {
            for nout in 1..=NCHANNELS {
                let input = test_signal(nin, 7);
                let refs: Vec<&[Sample]> = input.iter().map(|c| c.as_slice()).collect();
                let mut output = vec![vec![Sample::NAN; 7]; nout];
                let mut outs: Vec<&mut [Sample]> =
                    output.iter_mut().map(|c| c.as_mut_slice()).collect();
                mix(&m, &refs, &mut outs, 7).unwrap();

                for (j, plane) in output.iter().enumerate() {
                    for (s, &value) in plane.iter().enumerate() {
                        let mut expected = input[0][s] * m[0][j];
                        for (i, channel) in input.iter().enumerate().skip(1) {
                            expected += channel[s] * m[i][j];
                        }
                        assert_eq!(value, expected, "{nin} -> {nout}");
                    }
                }
            }
        }
    }

    #[test]
    fn in_place_matches_out_of_place() {
        let m = test_matrix();
        for nin in 1..=NCHANNELS {
            for nout in 1..=nin {
                let input = test_signal(nin, 9);
                let refs: Vec<&[Sample]> = input.iter().map(|c| c.as_slice()).collect();
                let mut expected = vec![vec![0.0; 9]; nout];
                let mut outs: Vec<&mut [Sample]> =
                    expected.iter_mut().map(|c| c.as_mut_slice()).collect();
                mix(&m, &refs, &mut outs, 9).unwrap();

                let mut work = input.clone();
                let mut chans: Vec<&mut [Sample]> =
                    work.iter_mut().map(|c| c.as_mut_slice()).collect();
                mix_in_place(&m, &mut chans, nout, 9).unwrap();
                assert_eq!(&work[..nout], &expected[..], "{nin} -> {nout}");
            }
        }
    }

    #[test]
    fn accumulation_order() {
        let mut m = Matrix::zero();
        m[0][0] = 1.0;
        m[1][0] = 1.0;
        m[2][0] = -1.0;
        let a = [1e16];
        let b = [1.0];
        let c = [1e16];
        let mut out = [0.0];
        mix(&m, &[&a[..], &b[..], &c[..]], &mut [&mut out[..]], 1).unwrap();
        // (1e16 + 1.0) rounds back to 1e16 before the last term is added.
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn in_place_expansion_is_rejected() {
        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        let err = mix_in_place(&Matrix::identity(), &mut [&mut a[..], &mut b[..]], 3, 4)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FilterError>(),
            Some(&FilterError::InPlaceExpansion {
                inputs: 2,
                outputs: 3
            })
        );
    }

    #[test]
    fn short_buffers_are_rejected() {
        let a = [0.0; 2];
        let mut out = [0.0; 4];
        let err = mix(&Matrix::identity(), &[&a[..]], &mut [&mut out[..]], 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FormatError>(),
            Some(FormatError::ChannelBufferTooShort { channel: 0, .. })
        ));
        assert!(mix(&Matrix::identity(), &[], &mut [&mut out[..]], 0).is_err());
    }

    #[test]
    fn downmix_filter() {
        let mut mixer = Mixer::new(MODE_STEREO).with_levels(MixLevels {
            clev: 0.5,
            slev: 0.5,
            lfelev: 0.0,
            normalize: false,
        });
        mixer.set_input(linear(MODE_5_1)).unwrap();
        assert_eq!(mixer.output(), linear(MODE_STEREO));

        let mut signal = test_signal(6, 8);
        let expected: Vec<Vec<Sample>> = vec![
            (0..8)
                .map(|s| signal[0][s] + 0.5 * signal[1][s] + 0.5 * signal[3][s])
                .collect(),
            (0..8)
                .map(|s| 0.5 * signal[1][s] + signal[2][s] + 0.5 * signal[4][s])
                .collect(),
        ];

        let chunk = Chunk::linear(
            linear(MODE_5_1),
            signal.iter_mut().map(|c| c.as_mut_slice()),
        );
        let out = mixer.process(chunk).unwrap();
        assert_eq!(out.spk, linear(MODE_STEREO));
        let planes = out.planes().unwrap();
        assert_eq!(planes.len(), 2);
        for ch in 0..2 {
            for s in 0..8 {
                assert!((planes[ch][s] - expected[ch][s]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn upmix_filter_uses_own_buffer() {
        let mut mixer = Mixer::new(MODE_3_2);
        mixer.set_input(linear(MODE_MONO)).unwrap();

        let mut mono = [0.25, -0.5, 1.0];
        let out = mixer
            .process(Chunk::linear(linear(MODE_MONO), [&mut mono[..]]).with_eos(true))
            .unwrap();
        assert!(out.eos);
        let planes = out.planes().unwrap();
        assert_eq!(planes.len(), 5);
        assert_eq!(planes[1], &[0.25, -0.5, 1.0]);
        assert_eq!(planes[0], &[0.0; 3]);
    }

    #[test]
    fn explicit_matrix_and_passthrough() {
        let mut mixer = Mixer::new(MODE_STEREO);
        mixer.set_input(linear(MODE_STEREO)).unwrap();

        let mut l = [1.0, 2.0];
        let mut r = [3.0, 4.0];
        {
            let out = mixer
                .process(Chunk::linear(linear(MODE_STEREO), [&mut l[..], &mut r[..]]))
                .unwrap();
            assert_eq!(out.planes().unwrap()[1], &[3.0, 4.0]);
        }

        let mut swap = Matrix::zero();
        swap[0][1] = 1.0;
        swap[1][0] = 1.0;
        mixer.set_matrix(swap);
        let out = mixer
            .process(Chunk::linear(linear(MODE_STEREO), [&mut l[..], &mut r[..]]))
            .unwrap();
        assert_eq!(out.planes().unwrap()[0], &[3.0, 4.0]);
        assert_eq!(out.planes().unwrap()[1], &[1.0, 2.0]);
    }

    #[test]
    fn plane_count_must_match_layout() {
        let mut mixer = Mixer::new(MODE_MONO);
        mixer.set_input(linear(MODE_5_1)).unwrap();
        let mut l = [0.5; 4];
        let mut r = [0.5; 4];
        let err = mixer
            .process(Chunk::linear(linear(MODE_5_1), [&mut l[..], &mut r[..]]))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::PlaneCount {
                spk: linear(MODE_5_1),
                planes: 2
            })
        );
    }

    #[test]
    fn raw_input_is_rejected() {
        let mut mixer = Mixer::new(MODE_STEREO);
        let spk = linear(MODE_5_1).with_format(Format::Pcm16);
        let err = mixer.set_input(spk).unwrap_err();
        assert_eq!(
            err.downcast_ref::<FilterError>(),
            Some(&FilterError::UnsupportedInput(spk))
        );

        let mut bad = Mixer::new(0);
        assert!(bad.set_input(linear(MODE_STEREO)).is_err());
        assert_eq!(bad.input(), Speakers::UNKNOWN);
    }
}
