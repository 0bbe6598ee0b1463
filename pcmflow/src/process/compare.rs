//! Comparison of two chunk streams.
//!
//! Streams are pulled independently and realigned by buffering, so chunk
//! boundaries of the two sides do not have to agree. Format differences and
//! data mismatches halt the comparison; a length difference is reported
//! through the configured fail level.

use anyhow::{Result, bail};
use log::Level;

use crate::log_or_err;
use crate::process::Source;
use crate::structs::chunk::ChunkData;
use crate::structs::speakers::{NCHANNELS, Sample, Speakers};
use crate::utils::errors::CompareError;

/// Units buffered from one side of a comparison.
#[derive(Default)]
struct Pending {
    spk: Option<Speakers>,
    raw: Vec<u8>,
    linear: [Vec<Sample>; NCHANNELS],
    start: usize,
    total: u64,
    eos: bool,
}

impl Pending {
    fn len(&self) -> usize {
        match self.spk {
            Some(spk) if spk.format.is_linear() => self.linear[0].len(),
            _ => self.raw.len(),
        }
    }

    fn available(&self) -> usize {
        self.len() - self.start
    }

    fn consume(&mut self, n: usize) {
        self.start += n;
    }

    fn compact(&mut self) {
        if self.start == 0 {
            return;
        }
        self.raw.drain(..self.start.min(self.raw.len()));
        for plane in self.linear.iter_mut() {
            plane.drain(..self.start.min(plane.len()));
        }
        self.start = 0;
    }

    fn raw(&self, n: usize) -> &[u8] {
        &self.raw[self.start..self.start + n]
    }

    fn plane(&self, ch: usize, n: usize) -> &[Sample] {
        &self.linear[ch][self.start..self.start + n]
    }

    /// Pulls one chunk. With `store` unset the data is only counted.
    fn pull(&mut self, source: &mut dyn Source, store: bool) -> Result<()> {
        let chunk = source.get_chunk()?;
        chunk.validate()?;
        let spk = *self.spk.get_or_insert(chunk.spk);
        if chunk.spk != spk {
            bail!(CompareError::FormatChanged {
                from: spk,
                to: chunk.spk,
                position: self.total,
            });
        }

        if store {
            self.compact();
            match &chunk.data {
                ChunkData::Dummy => {}
                ChunkData::Raw(bytes) => self.raw.extend_from_slice(bytes),
                ChunkData::Linear(planes) => {
                    for (buf, plane) in self.linear.iter_mut().zip(planes.iter()) {
                        buf.extend_from_slice(plane);
                    }
                }
            }
        }
        self.total += chunk.size() as u64;

        let eos = chunk.eos;
        let empty = chunk.is_empty();
        drop(chunk);
        self.eos = eos || (empty && source.is_empty());
        Ok(())
    }
}

/// Peak and RMS level of a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Levels {
    pub peak: Sample,
    pub rms: Sample,
}

#[derive(Debug, Default)]
struct Accumulator {
    peak: Sample,
    sum_sq: Sample,
}

impl Accumulator {
    fn add(&mut self, value: Sample) {
        self.peak = self.peak.max(value.abs());
        self.sum_sq += value * value;
    }

    fn levels(&self, count: u64) -> Levels {
        Levels {
            peak: self.peak,
            rms: if count == 0 {
                0.0
            } else {
                (self.sum_sq / count as Sample).sqrt()
            },
        }
    }
}

/// Result of a successful bit-exact comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareReport {
    pub spk: Speakers,
    /// Units compared and found equal.
    pub units: u64,
    pub test_units: u64,
    pub reference_units: u64,
}

impl CompareReport {
    pub fn same_length(&self) -> bool {
        self.test_units == self.reference_units
    }
}

/// Level statistics of two linear streams and of their difference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiffReport {
    pub spk: Speakers,
    /// Samples per channel taken into account.
    pub units: u64,
    pub test: Levels,
    pub reference: Levels,
    pub diff: Levels,
}

impl DiffReport {
    /// Reference to difference power ratio in dB, infinite for equal streams.
    pub fn snr_db(&self) -> Sample {
        if self.diff.rms > 0.0 {
            20.0 * (self.reference.rms / self.diff.rms).log10()
        } else {
            Sample::INFINITY
        }
    }
}

/// Stream comparison harness.
#[derive(Debug, Clone)]
pub struct Comparator {
    /// Length differences at or below this level are returned as errors.
    pub fail_level: Level,
}

impl Default for Comparator {
    fn default() -> Self {
        Self {
            fail_level: Level::Error,
        }
    }
}

impl Comparator {
    pub fn new(fail_level: Level) -> Self {
        Self { fail_level }
    }

    /// Drives both sources, calling `visit` for every aligned run of units.
    fn run<F>(
        &self,
        test: &mut dyn Source,
        reference: &mut dyn Source,
        mut visit: F,
    ) -> Result<(Speakers, u64, u64, u64)>
    where
        F: FnMut(Speakers, u64, &Pending, &Pending, usize) -> Result<()>,
    {
        let mut a = Pending::default();
        let mut b = Pending::default();
        let mut position = 0u64;

        loop {
            while a.available() == 0 && !a.eos {
                a.pull(test, true)?;
            }
            while b.available() == 0 && !b.eos {
                b.pull(reference, true)?;
            }
            if let (Some(test), Some(reference)) = (a.spk, b.spk) {
                if test != reference {
                    bail!(CompareError::FormatMismatch { test, reference });
                }
            }

            let n = a.available().min(b.available());
            if n == 0 {
                break;
            }
            let spk = a.spk.or(b.spk).unwrap_or_default();
            visit(spk, position, &a, &b, n)?;
            a.consume(n);
            b.consume(n);
            position += n as u64;
        }

        while !a.eos {
            a.pull(test, false)?;
        }
        while !b.eos {
            b.pull(reference, false)?;
        }

        if a.total != b.total {
            log_or_err!(
                self,
                Level::Warn,
                CompareError::LengthMismatch {
                    test: a.total,
                    reference: b.total,
                }
            );
        }

        let spk = a.spk.or(b.spk).unwrap_or_default();
        Ok((spk, position, a.total, b.total))
    }

    /// Compares two streams for exact equality.
    ///
    /// Raw streams are compared byte by byte, linear streams sample by
    /// sample on their bit patterns.
    pub fn compare(
        &self,
        test: &mut dyn Source,
        reference: &mut dyn Source,
    ) -> Result<CompareReport> {
        let (spk, units, test_units, reference_units) =
            self.run(test, reference, |spk, position, a, b, n| {
                if spk.format.is_linear() {
                    let mismatch = (0..spk.nch())
                        .filter_map(|ch| {
                            let (x, y) = (a.plane(ch, n), b.plane(ch, n));
                            (0..n)
                                .find(|&s| x[s].to_bits() != y[s].to_bits())
                                .map(|s| (s, ch, x[s], y[s]))
                        })
                        .min_by_key(|&(s, ch, ..)| (s, ch));
                    if let Some((s, channel, test, reference)) = mismatch {
                        bail!(CompareError::DataMismatch {
                            position: position + s as u64,
                            channel,
                            test,
                            reference,
                        });
                    }
                } else {
                    let (x, y) = (a.raw(n), b.raw(n));
                    if let Some(i) = (0..n).find(|&i| x[i] != y[i]) {
                        let byte = position + i as u64;
                        let frame_size = spk.frame_size().unwrap_or(1) as u64;
                        let sample_size = spk.format.sample_size().unwrap_or(1) as u64;
                        bail!(CompareError::DataMismatch {
                            position: byte,
                            channel: ((byte % frame_size) / sample_size) as usize,
                            test: x[i] as f64,
                            reference: y[i] as f64,
                        });
                    }
                }
                Ok(())
            })?;

        Ok(CompareReport {
            spk,
            units,
            test_units,
            reference_units,
        })
    }

    /// Computes peak and RMS levels of two linear streams and of their
    /// difference over the common length.
    pub fn diff(&self, test: &mut dyn Source, reference: &mut dyn Source) -> Result<DiffReport> {
        let mut acc_test = Accumulator::default();
        let mut acc_reference = Accumulator::default();
        let mut acc_diff = Accumulator::default();

        let (spk, units, ..) = self.run(test, reference, |spk, _, a, b, n| {
            if !spk.format.is_linear() {
                bail!(CompareError::NotLinear(spk));
            }
            for ch in 0..spk.nch() {
                for (&x, &y) in a.plane(ch, n).iter().zip(b.plane(ch, n)) {
                    acc_test.add(x);
                    acc_reference.add(y);
                    acc_diff.add(x - y);
                }
            }
            Ok(())
        })?;

        let count = units * spk.nch() as u64;
        Ok(DiffReport {
            spk,
            units,
            test: acc_test.levels(count),
            reference: acc_reference.levels(count),
            diff: acc_diff.levels(count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::source::{NoiseSource, RawSource};
    use crate::structs::chunk::Chunk;
    use crate::structs::speakers::{Format, MODE_MONO, MODE_STEREO};

    const PCM16: Speakers = Speakers::new(Format::Pcm16, MODE_STEREO, 48000);
    const LINEAR: Speakers = Speakers::new(Format::Linear, MODE_MONO, 48000);

    /// Replays a fixed list of mono linear blocks.
    struct Blocks {
        spk: Speakers,
        blocks: Vec<Vec<Sample>>,
        next: usize,
    }

    impl Blocks {
        fn new(spk: Speakers, blocks: Vec<Vec<Sample>>) -> Self {
            Self {
                spk,
                blocks,
                next: 0,
            }
        }
    }

    impl Source for Blocks {
        fn output(&self) -> Speakers {
            self.spk
        }

        fn is_empty(&self) -> bool {
            self.next >= self.blocks.len()
        }

        fn get_chunk(&mut self) -> Result<Chunk<'_>> {
            let eos = self.next + 1 >= self.blocks.len();
            let Some(block) = self.blocks.get_mut(self.next) else {
                return Ok(Chunk::dummy(self.spk).with_eos(true));
            };
            self.next += 1;
            Ok(Chunk::linear(self.spk, [block.as_mut_slice()]).with_eos(eos))
        }
    }

    fn raw(data: &[u8], block: usize) -> RawSource<&[u8]> {
        RawSource::new(data, PCM16, block).unwrap()
    }

    #[test]
    fn identical_streams_with_different_blocking() {
        let data: Vec<u8> = (0..=255).collect();
        let report = Comparator::default()
            .compare(&mut raw(&data, 7), &mut raw(&data, 64))
            .unwrap();
        assert_eq!(report.units, 256);
        assert!(report.same_length());
        assert_eq!(report.spk, PCM16);
    }

    #[test]
    fn mismatch_position_and_channel() {
        let data: Vec<u8> = (0..64).collect();
        let mut other = data.clone();
        other[45] ^= 1;

        let err = Comparator::default()
            .compare(&mut raw(&data, 10), &mut raw(&other, 16))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CompareError>(),
            Some(&CompareError::DataMismatch {
                position: 45,
                channel: 0,
                test: 45.0,
                reference: 44.0,
            })
        );
    }

    #[test]
    fn linear_mismatch_reports_earliest_sample() {
        let mut test = Blocks::new(LINEAR, vec![vec![0.0, 0.5], vec![0.25, 1.0]]);
        let mut reference = Blocks::new(LINEAR, vec![vec![0.0], vec![0.5, 0.25, 0.75]]);
        let err = Comparator::default()
            .compare(&mut test, &mut reference)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CompareError>(),
            Some(&CompareError::DataMismatch {
                position: 3,
                channel: 0,
                test: 1.0,
                reference: 0.75,
            })
        );
    }

    #[test]
    fn length_mismatch_follows_fail_level() {
        let data: Vec<u8> = (0..40).collect();

        let report = Comparator::default()
            .compare(&mut raw(&data, 16), &mut raw(&data[..32], 16))
            .unwrap();
        assert_eq!(report.units, 32);
        assert_eq!(report.test_units, 40);
        assert!(!report.same_length());

        let err = Comparator::new(Level::Warn)
            .compare(&mut raw(&data, 16), &mut raw(&data[..32], 16))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CompareError>(),
            Some(&CompareError::LengthMismatch {
                test: 40,
                reference: 32
            })
        );
    }

    #[test]
    fn format_mismatch() {
        let data = [0u8; 8];
        let mut a = raw(&data, 8);
        let mut b = RawSource::new(&data[..], PCM16.with_format(Format::Pcm32), 8).unwrap();
        let err = Comparator::default().compare(&mut a, &mut b).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CompareError>(),
            Some(CompareError::FormatMismatch { .. })
        ));
    }

    #[test]
    fn diff_statistics() {
        let mut test = Blocks::new(LINEAR, vec![vec![0.5, -0.5, 0.5, -0.5]]);
        let mut reference = Blocks::new(LINEAR, vec![vec![0.5, -0.5], vec![0.5, 0.5]]);
        let report = Comparator::default()
            .diff(&mut test, &mut reference)
            .unwrap();
        assert_eq!(report.units, 4);
        assert_eq!(report.test, Levels { peak: 0.5, rms: 0.5 });
        assert_eq!(report.reference.peak, 0.5);
        assert_eq!(report.diff.peak, 1.0);
        assert_eq!(report.diff.rms, 0.5);
        assert!((report.snr_db() - 0.0).abs() < 1e-12);

        let mut a = NoiseSource::new(LINEAR, 1000, 256, 3).unwrap();
        let mut b = NoiseSource::new(LINEAR, 1000, 100, 3).unwrap();
        let report = Comparator::default().diff(&mut a, &mut b).unwrap();
        assert_eq!(report.diff, Levels::default());
        assert!(report.snr_db().is_infinite());
    }

    #[test]
    fn diff_requires_linear_streams() {
        let data = [0u8; 8];
        let err = Comparator::default()
            .diff(&mut raw(&data, 8), &mut raw(&data, 8))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<CompareError>(),
            Some(&CompareError::NotLinear(PCM16))
        );
    }
}
