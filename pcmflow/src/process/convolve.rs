use anyhow::{Result, bail};
use log::debug;

use crate::process::{Filter, check_input};
use crate::structs::chunk::Chunk;
use crate::structs::fir::{FirGen, FirInstance, FirKind};
use crate::structs::speakers::{NCHANNELS, Sample, Speakers};
use crate::utils::errors::FilterError;

/// Filter applying the kernel of a [`FirGen`] to every channel.
///
/// The kernel is rebuilt whenever the generator version or the input sample
/// rate changes. Custom kernels are applied as a causal convolution, so the
/// output lags the input by the kernel centre.
pub struct Convolver<G> {
    generator: G,
    fir: Option<FirInstance>,
    version: u64,

    input: Speakers,
    history: [Vec<Sample>; NCHANNELS],
    scratch: Vec<Sample>,
}

impl<G: FirGen> Convolver<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            fir: None,
            version: 0,
            input: Speakers::UNKNOWN,
            history: Default::default(),
            scratch: Vec::new(),
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Parameter changes are picked up at the next chunk.
    pub fn generator_mut(&mut self) -> &mut G {
        &mut self.generator
    }

    pub fn fir(&self) -> Option<&FirInstance> {
        self.fir.as_ref()
    }

    /// Output delay in samples.
    pub fn latency(&self) -> usize {
        self.fir.as_ref().map_or(0, |fir| match fir.kind {
            FirKind::Custom => fir.center,
            _ => 0,
        })
    }

    fn is_current(&self, sample_rate: u32) -> bool {
        self.fir.as_ref().is_some_and(|fir| {
            fir.sample_rate == sample_rate && self.version == self.generator.version()
        })
    }

    fn update_kernel(&mut self, sample_rate: u32) -> Result<()> {
        if self.is_current(sample_rate) {
            return Ok(());
        }

        let version = self.generator.version();
        let fir = self.generator.make(sample_rate)?;
        debug!(
            "FIR kernel rebuilt: {:?}, {} taps at {sample_rate} Hz",
            fir.kind,
            fir.len()
        );

        let history = fir.len().saturating_sub(1);
        for channel in self.history.iter_mut() {
            channel.clear();
            channel.resize(history, 0.0);
        }
        self.fir = Some(fir);
        self.version = version;
        Ok(())
    }

    fn convolve(
        fir: &FirInstance,
        history: &mut Vec<Sample>,
        scratch: &mut Vec<Sample>,
        plane: &mut [Sample],
    ) {
        let taps = &fir.data;
        let past = history.len();

        scratch.clear();
        scratch.extend_from_slice(history);
        scratch.extend_from_slice(plane);

        for (s, out) in plane.iter_mut().enumerate() {
            let newest = past + s;
            let mut acc = 0.0;
            for (k, tap) in taps.iter().enumerate() {
                acc += tap * scratch[newest - k];
            }
            *out = acc;
        }

        history.clear();
        history.extend_from_slice(&scratch[scratch.len() - past..]);
    }
}

impl<G: FirGen> Filter for Convolver<G> {
    fn set_input(&mut self, spk: Speakers) -> Result<()> {
        if !spk.format.is_linear() {
            bail!(FilterError::UnsupportedInput(spk));
        }
        spk.validate()?;
        self.update_kernel(spk.sample_rate)?;
        self.input = spk;
        Ok(())
    }

    fn input(&self) -> Speakers {
        self.input
    }

    fn output(&self) -> Speakers {
        self.input
    }

    fn process<'a>(&'a mut self, mut chunk: Chunk<'a>) -> Result<Chunk<'a>> {
        check_input(self.input, &chunk)?;
        self.update_kernel(self.input.sample_rate)?;

        let Some(fir) = self.fir.as_ref() else {
            bail!(FilterError::NotConfigured);
        };
        let Some(planes) = chunk.planes_mut() else {
            return Ok(chunk);
        };

        match fir.kind {
            FirKind::Identity => {}
            FirKind::Zero => planes.iter_mut().for_each(|plane| plane.fill(0.0)),
            FirKind::Gain => {
                let gain = fir.data[0];
                for plane in planes.iter_mut() {
                    plane.iter_mut().for_each(|sample| *sample *= gain);
                }
            }
            FirKind::Custom => {
                for (plane, history) in planes.iter_mut().zip(self.history.iter_mut()) {
                    Self::convolve(fir, history, &mut self.scratch, plane);
                }
            }
        }
        Ok(chunk)
    }

    fn reset(&mut self) {
        self.history
            .iter_mut()
            .for_each(|channel| channel.fill(0.0));
    }
}
