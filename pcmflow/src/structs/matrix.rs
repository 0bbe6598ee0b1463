//! Mixing matrices for multichannel routing.
//!
//! A [`Matrix`] is indexed by buffer position: entry `[i][j]` is the
//! contribution of input channel `i` to output channel `j`. Positions follow
//! the fixed channel order of the layout masks, so a matrix only has meaning
//! together with the input and output masks it was built for.

use std::ops::{Add, Index, IndexMut};

use crate::structs::speakers::{Channel, Format, NCHANNELS, Sample, Speakers};

/// -3 dB, the usual centre and surround downmix level.
pub const LEVEL_MINUS_3DB: Sample = std::f64::consts::FRAC_1_SQRT_2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [[Sample; NCHANNELS]; NCHANNELS]);

impl Default for Matrix {
    fn default() -> Self {
        Self::zero()
    }
}

impl Matrix {
    pub const fn zero() -> Self {
        Self([[0.0; NCHANNELS]; NCHANNELS])
    }

    pub fn identity() -> Self {
        let mut m = Self::zero();
        for i in 0..NCHANNELS {
            m.0[i][i] = 1.0;
        }
        m
    }

    pub fn scaled(mut self, factor: Sample) -> Self {
        self.0
            .iter_mut()
            .flatten()
            .for_each(|value| *value *= factor);
        self
    }

    /// Largest sum of absolute gains feeding any output among the first
    /// `nin` x `nout` entries.
    pub fn max_output_gain(&self, nin: usize, nout: usize) -> Sample {
        (0..nout.min(NCHANNELS))
            .map(|j| {
                self.0[..nin.min(NCHANNELS)]
                    .iter()
                    .map(|row| row[j].abs())
                    .sum::<Sample>()
            })
            .fold(0.0, Sample::max)
    }

    /// Builds a positional routing matrix from `in_mask` to `out_mask`.
    ///
    /// Same-named channels pass at unity. A centre missing from the output is
    /// spread to L/R at `clev`; missing surrounds fold into the fronts (or the
    /// centre) at `slev`; a missing LFE goes to the fronts at `lfelev`. Fronts
    /// missing from the output fold into the centre. With `normalize`, the
    /// whole matrix is scaled so that no output has a total gain above 1.
    pub fn downmix(in_mask: u32, out_mask: u32, levels: &MixLevels) -> Self {
        let has = |mask: u32, ch: Channel| mask & ch.mask() != 0;
        let mut named = [[0.0; NCHANNELS]; NCHANNELS];

        for ch in Channel::ALL {
            if has(in_mask, ch) && has(out_mask, ch) {
                named[ch as usize][ch as usize] = 1.0;
            }
        }

        let mut route = |from: Channel, to: &[Channel], level: Sample| {
            if !has(in_mask, from) || has(out_mask, from) {
                return;
            }
            for &target in to {
                if has(out_mask, target) {
                    named[from as usize][target as usize] += level;
                }
            }
        };

        let fronts_out = has(out_mask, Channel::L) || has(out_mask, Channel::R);

        if fronts_out {
            route(Channel::C, &[Channel::L, Channel::R], levels.clev);
            route(Channel::SL, &[Channel::L], levels.slev);
            route(Channel::SR, &[Channel::R], levels.slev);
            route(Channel::Lfe, &[Channel::L, Channel::R], levels.lfelev);
        } else {
            route(Channel::L, &[Channel::C], 1.0);
            route(Channel::R, &[Channel::C], 1.0);
            route(Channel::SL, &[Channel::C], levels.slev);
            route(Channel::SR, &[Channel::C], levels.slev);
            route(Channel::Lfe, &[Channel::C], levels.lfelev);
        }

        // Single-sided fronts or surrounds in the output take the other side.
        route(Channel::L, &[Channel::R], 1.0);
        route(Channel::R, &[Channel::L], 1.0);
        if !has(out_mask, Channel::SL) {
            route(Channel::SR, &[Channel::SL], 1.0);
        }
        if !has(out_mask, Channel::SR) {
            route(Channel::SL, &[Channel::SR], 1.0);
        }

        let input = Speakers::new(Format::Linear, in_mask, 0);
        let output = Speakers::new(Format::Linear, out_mask, 0);
        let mut m = Self::zero();
        for (i, from) in input.channels().enumerate() {
            for (j, to) in output.channels().enumerate() {
                m.0[i][j] = named[from as usize][to as usize];
            }
        }

        if levels.normalize {
            let gain = m.max_output_gain(input.nch(), output.nch());
            if gain > 1.0 {
                m = m.scaled(1.0 / gain);
            }
        }
        m
    }
}

impl Index<usize> for Matrix {
    type Output = [Sample; NCHANNELS];

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl IndexMut<usize> for Matrix {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.0[index]
    }
}

impl Add for Matrix {
    type Output = Matrix;

    fn add(mut self, rhs: Matrix) -> Matrix {
        for (row, other) in self.0.iter_mut().zip(rhs.0.iter()) {
            for (value, other) in row.iter_mut().zip(other.iter()) {
                *value += other;
            }
        }
        self
    }
}

/// Levels used to compute a routing matrix automatically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixLevels {
    /// Centre mix level.
    pub clev: Sample,
    /// Surround mix level.
    pub slev: Sample,
    /// LFE mix level.
    pub lfelev: Sample,
    pub normalize: bool,
}

impl Default for MixLevels {
    fn default() -> Self {
        Self {
            clev: LEVEL_MINUS_3DB,
            slev: LEVEL_MINUS_3DB,
            lfelev: 1.0,
            normalize: true,
        }
    }
}
