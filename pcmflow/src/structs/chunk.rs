//! Borrowed views of streaming audio data.

use anyhow::{Result, bail};
use arrayvec::ArrayVec;

use crate::structs::speakers::{NCHANNELS, Sample, Speakers};
use crate::utils::errors::FormatError;

/// Planar channel buffers of a linear chunk.
pub type Planes<'a> = ArrayVec<&'a mut [Sample], NCHANNELS>;

/// Payload of a [`Chunk`].
#[derive(Debug, Default)]
pub enum ChunkData<'a> {
    /// Metadata-only marker carrying a format change or end of stream.
    #[default]
    Dummy,
    /// One buffer per channel, all of equal length.
    Linear(Planes<'a>),
    /// Interleaved encoded bytes.
    Raw(&'a [u8]),
}

/// A bounded unit of streaming audio.
///
/// Buffers are borrowed from the producing source or filter and stay valid
/// until the next call into it. Constructors never produce an empty non-dummy
/// chunk: empty data becomes a dummy chunk with the same descriptor.
#[derive(Debug)]
pub struct Chunk<'a> {
    pub spk: Speakers,
    pub data: ChunkData<'a>,
    pub eos: bool,
}

impl<'a> Chunk<'a> {
    pub fn dummy(spk: Speakers) -> Self {
        Self {
            spk,
            data: ChunkData::Dummy,
            eos: false,
        }
    }

    /// Builds a linear chunk. Planes are trimmed to the shortest one.
    pub fn linear<I>(spk: Speakers, planes: I) -> Self
    where
        I: IntoIterator<Item = &'a mut [Sample]>,
    {
        let mut planes: Planes<'a> = planes.into_iter().take(NCHANNELS).collect();
        let size = planes.iter().map(|p| p.len()).min().unwrap_or(0);

        if size == 0 {
            return Self::dummy(spk);
        }

        for plane in planes.iter_mut() {
            let whole = std::mem::take(plane);
            *plane = whole.split_at_mut(size).0;
        }

        Self {
            spk,
            data: ChunkData::Linear(planes),
            eos: false,
        }
    }

    pub fn raw(spk: Speakers, bytes: &'a [u8]) -> Self {
        if bytes.is_empty() {
            return Self::dummy(spk);
        }

        Self {
            spk,
            data: ChunkData::Raw(bytes),
            eos: false,
        }
    }

    pub fn with_eos(mut self, eos: bool) -> Self {
        self.eos = eos;
        self
    }

    /// Samples per channel for linear data, bytes for raw data.
    pub fn size(&self) -> usize {
        match &self.data {
            ChunkData::Dummy => 0,
            ChunkData::Linear(planes) => planes.first().map_or(0, |p| p.len()),
            ChunkData::Raw(bytes) => bytes.len(),
        }
    }

    pub fn is_dummy(&self) -> bool {
        matches!(self.data, ChunkData::Dummy)
    }

    /// True when no units remain, including after full consumption.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drops the first `n` units (clamped to the chunk size).
    pub fn drop_front(&mut self, n: usize) {
        let n = n.min(self.size());
        match &mut self.data {
            ChunkData::Dummy => {}
            ChunkData::Linear(planes) => {
                for plane in planes.iter_mut() {
                    let whole = std::mem::take(plane);
                    *plane = whole.split_at_mut(n).1;
                }
            }
            ChunkData::Raw(bytes) => *bytes = &bytes[n..],
        }
    }

    pub fn planes(&self) -> Option<&[&'a mut [Sample]]> {
        match &self.data {
            ChunkData::Linear(planes) => Some(planes.as_slice()),
            _ => None,
        }
    }

    pub fn planes_mut(&mut self) -> Option<&mut [&'a mut [Sample]]> {
        match &mut self.data {
            ChunkData::Linear(planes) => Some(planes.as_mut_slice()),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&'a [u8]> {
        match self.data {
            ChunkData::Raw(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Checks that the payload fits the descriptor: linear planes, one per
    /// channel, for a linear format and raw bytes otherwise.
    pub fn validate(&self) -> Result<()> {
        let linear = self.spk.format.is_linear();
        match &self.data {
            ChunkData::Dummy => {}
            ChunkData::Linear(_) if !linear => bail!(FormatError::DataKind {
                spk: self.spk,
                found: "linear",
            }),
            ChunkData::Linear(planes) if planes.len() != self.spk.nch() => {
                bail!(FormatError::PlaneCount {
                    spk: self.spk,
                    planes: planes.len(),
                })
            }
            ChunkData::Linear(_) => {}
            ChunkData::Raw(_) if linear => bail!(FormatError::DataKind {
                spk: self.spk,
                found: "raw",
            }),
            ChunkData::Raw(_) => {}
        }
        Ok(())
    }

    /// Splits the chunk into descriptor, end-of-stream flag and planes.
    pub fn into_planes(self) -> Option<(Speakers, bool, Planes<'a>)> {
        match self.data {
            ChunkData::Linear(planes) => Some((self.spk, self.eos, planes)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::speakers::{Format, MODE_STEREO};

    const LINEAR: Speakers = Speakers::new(Format::Linear, MODE_STEREO, 48000);
    const RAW: Speakers = Speakers::new(Format::Pcm16, MODE_STEREO, 48000);

    #[test]
    fn empty_data_becomes_dummy() {
        let chunk = Chunk::raw(RAW, &[]);
        assert!(chunk.is_dummy());
        assert_eq!(chunk.spk, RAW);

        let mut a: [Sample; 0] = [];
        let mut b: [Sample; 0] = [];
        let chunk = Chunk::linear(LINEAR, [&mut a[..], &mut b[..]]);
        assert!(chunk.is_dummy());
    }

    #[test]
    fn linear_planes_are_trimmed() {
        let mut a = [1.0, 2.0, 3.0];
        let mut b = [4.0, 5.0];
        let chunk = Chunk::linear(LINEAR, [&mut a[..], &mut b[..]]);
        assert_eq!(chunk.size(), 2);
        assert_eq!(chunk.planes().unwrap()[0], &[1.0, 2.0]);
    }

    #[test]
    fn drop_front_consumes_units() {
        let mut a = [1.0, 2.0, 3.0];
        let mut b = [4.0, 5.0, 6.0];
        let mut chunk = Chunk::linear(LINEAR, [&mut a[..], &mut b[..]]).with_eos(true);
        chunk.drop_front(2);
        assert_eq!(chunk.size(), 1);
        assert_eq!(chunk.planes().unwrap()[1], &[6.0]);
        assert!(chunk.eos);

        chunk.drop_front(10);
        assert!(chunk.is_empty());
        assert!(!chunk.is_dummy());

        let bytes = [1u8, 2, 3, 4];
        let mut chunk = Chunk::raw(RAW, &bytes);
        chunk.drop_front(3);
        assert_eq!(chunk.bytes(), Some(&[4u8][..]));
    }

    #[test]
    fn payload_must_fit_descriptor() {
        let mut a = [0.5, 0.5];
        let mut b = [0.5, 0.5];
        assert!(Chunk::linear(LINEAR, [&mut a[..], &mut b[..]]).validate().is_ok());
        assert!(Chunk::raw(RAW, &[1, 2, 3, 4]).validate().is_ok());
        assert!(Chunk::dummy(LINEAR).validate().is_ok());

        let err = Chunk::linear(LINEAR, [&mut a[..]]).validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::PlaneCount {
                spk: LINEAR,
                planes: 1
            })
        );

        let err = Chunk::linear(RAW, [&mut a[..], &mut b[..]])
            .validate()
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::DataKind {
                spk: RAW,
                found: "linear"
            })
        );

        let err = Chunk::raw(LINEAR, &[1, 2, 3, 4]).validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<FormatError>(),
            Some(&FormatError::DataKind {
                spk: LINEAR,
                found: "raw"
            })
        );
    }
}
