//! FIR kernel generators.
//!
//! A generator describes a filter in sample-rate independent terms and
//! produces a concrete [`FirInstance`] for a given rate on demand. Consumers
//! cache the instance and compare [`FirGen::version`] to find out when a
//! parameter changed and the kernel must be rebuilt.
//!
//! Degenerate kernels are reported by kind so that consumers can skip the
//! convolution: a zero kernel clears the signal, an identity kernel passes it
//! unchanged and a gain kernel is a single multiplication.

use anyhow::{Result, bail};

use crate::structs::speakers::Sample;
use crate::utils::errors::FirError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirKind {
    Zero,
    Identity,
    Gain,
    Custom,
}

/// Immutable kernel built for one sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct FirInstance {
    pub sample_rate: u32,
    pub kind: FirKind,
    /// Index of the tap aligned with the current input sample.
    pub center: usize,
    pub data: Vec<Sample>,
}

impl FirInstance {
    pub fn zero(sample_rate: u32) -> Result<Self> {
        Self::with_taps(sample_rate, FirKind::Zero, 0, &[0.0])
    }

    pub fn identity(sample_rate: u32) -> Result<Self> {
        Self::with_taps(sample_rate, FirKind::Identity, 0, &[1.0])
    }

    /// Single-tap kernel; gains of exactly 0 and 1 collapse to the zero and
    /// identity kernels.
    pub fn gain(sample_rate: u32, gain: Sample) -> Result<Self> {
        if gain == 0.0 {
            Self::zero(sample_rate)
        } else if gain == 1.0 {
            Self::identity(sample_rate)
        } else {
            Self::with_taps(sample_rate, FirKind::Gain, 0, &[gain])
        }
    }

    pub fn custom(sample_rate: u32, center: usize, data: &[Sample]) -> Result<Self> {
        if data.is_empty() {
            bail!(FirError::EmptyKernel);
        }
        if center >= data.len() {
            bail!(FirError::CenterOutOfRange {
                center,
                len: data.len(),
            });
        }
        Self::with_taps(sample_rate, FirKind::Custom, center, data)
    }

    fn with_taps(sample_rate: u32, kind: FirKind, center: usize, taps: &[Sample]) -> Result<Self> {
        if sample_rate == 0 {
            bail!(FirError::InvalidSampleRate);
        }
        let mut data = alloc_taps(taps.len())?;
        data.extend_from_slice(taps);
        Ok(Self {
            sample_rate,
            kind,
            center,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn alloc_taps(len: usize) -> Result<Vec<Sample>> {
    let mut data = Vec::new();
    if data.try_reserve_exact(len).is_err() {
        bail!(FirError::Alloc(len));
    }
    Ok(data)
}

/// Source of sample-rate specific FIR kernels.
pub trait FirGen {
    /// Changes whenever a parameter affecting the kernel changes.
    fn version(&self) -> u64;

    /// Builds the kernel for `sample_rate`. Never mutates the generator.
    fn make(&self, sample_rate: u32) -> Result<FirInstance>;
}

impl<G: FirGen + ?Sized> FirGen for &G {
    fn version(&self) -> u64 {
        (**self).version()
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        (**self).make(sample_rate)
    }
}

impl<G: FirGen + ?Sized> FirGen for Box<G> {
    fn version(&self) -> u64 {
        (**self).version()
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        (**self).make(sample_rate)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroFir;

impl FirGen for ZeroFir {
    fn version(&self) -> u64 {
        0
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        FirInstance::zero(sample_rate)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityFir;

impl FirGen for IdentityFir {
    fn version(&self) -> u64 {
        0
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        FirInstance::identity(sample_rate)
    }
}

#[derive(Debug, Clone)]
pub struct GainFir {
    gain: Sample,
    version: u64,
}

impl Default for GainFir {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GainFir {
    pub fn new(gain: Sample) -> Self {
        Self { gain, version: 0 }
    }

    pub fn gain(&self) -> Sample {
        self.gain
    }

    pub fn set_gain(&mut self, gain: Sample) {
        if self.gain != gain {
            self.gain = gain;
            self.version = self.version.wrapping_add(1);
        }
    }
}

impl FirGen for GainFir {
    fn version(&self) -> u64 {
        self.version
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        FirInstance::gain(sample_rate, self.gain)
    }
}

/// Direct signal plus one delayed copy.
#[derive(Debug, Clone, Default)]
pub struct EchoFir {
    /// Delay in seconds.
    delay: f64,
    gain: Sample,
    version: u64,
}

impl EchoFir {
    pub fn new(delay: f64, gain: Sample) -> Self {
        Self {
            delay,
            gain,
            version: 0,
        }
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    pub fn gain(&self) -> Sample {
        self.gain
    }

    pub fn set_delay(&mut self, delay: f64) {
        if self.delay != delay {
            self.delay = delay;
            self.version = self.version.wrapping_add(1);
        }
    }

    pub fn set_gain(&mut self, gain: Sample) {
        if self.gain != gain {
            self.gain = gain;
            self.version = self.version.wrapping_add(1);
        }
    }

    pub fn set(&mut self, delay: f64, gain: Sample) {
        self.set_delay(delay);
        self.set_gain(gain);
    }
}

impl FirGen for EchoFir {
    fn version(&self) -> u64 {
        self.version
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        if sample_rate == 0 {
            bail!(FirError::InvalidSampleRate);
        }

        let n = (self.delay * sample_rate as f64).floor().max(0.0) as usize;
        if n == 0 {
            // Impulse and echo land on the same tap.
            return FirInstance::gain(sample_rate, 1.0 + self.gain);
        }

        let len = n.checked_add(1).ok_or(FirError::Alloc(n))?;
        let mut data = alloc_taps(len)?;
        data.resize(len, 0.0);
        data[0] = 1.0;
        data[n] = self.gain;

        Ok(FirInstance {
            sample_rate,
            kind: FirKind::Custom,
            center: 0,
            data,
        })
    }
}

/// Fixed kernel designed for a single sample rate.
#[derive(Debug, Clone)]
pub struct CustomFir {
    sample_rate: u32,
    center: usize,
    data: Vec<Sample>,
    version: u64,
}

impl CustomFir {
    pub fn new(sample_rate: u32, center: usize, data: Vec<Sample>) -> Self {
        Self {
            sample_rate,
            center,
            data,
            version: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set(&mut self, sample_rate: u32, center: usize, data: Vec<Sample>) {
        if self.sample_rate != sample_rate || self.center != center || self.data != data {
            self.sample_rate = sample_rate;
            self.center = center;
            self.data = data;
            self.version = self.version.wrapping_add(1);
        }
    }
}

impl FirGen for CustomFir {
    fn version(&self) -> u64 {
        self.version
    }

    fn make(&self, sample_rate: u32) -> Result<FirInstance> {
        if sample_rate == 0 {
            bail!(FirError::InvalidSampleRate);
        }
        if sample_rate != self.sample_rate {
            bail!(FirError::SampleRateMismatch {
                expected: self.sample_rate,
                requested: sample_rate,
            });
        }
        FirInstance::custom(sample_rate, self.center, &self.data)
    }
}
