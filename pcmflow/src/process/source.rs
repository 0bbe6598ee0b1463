use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::{Result, bail};
use arrayvec::ArrayVec;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::process::Source;
use crate::process::convert::linear_to_raw;
use crate::structs::chunk::{Chunk, Planes};
use crate::structs::speakers::{NCHANNELS, Sample, Speakers};
use crate::utils::errors::SourceError;

/// Headerless raw PCM stream read in fixed-size blocks.
///
/// The stream format cannot be detected and must be supplied by the caller.
/// Blocks are cut at byte granularity, so frames may straddle chunks.
pub struct RawSource<R> {
    reader: R,
    spk: Speakers,
    block: Vec<u8>,
    position: u64,
    eof: bool,
}

impl<R: Read> RawSource<R> {
    pub fn new(reader: R, spk: Speakers, block_size: usize) -> Result<Self> {
        if spk.format.is_linear() {
            bail!(SourceError::UnsupportedFormat(spk));
        }
        spk.validate()?;
        if block_size == 0 {
            bail!(SourceError::ZeroBlockSize);
        }

        Ok(Self {
            reader,
            spk,
            block: vec![0; block_size],
            position: 0,
            eof: false,
        })
    }

    /// Bytes read so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl RawSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, spk: Speakers, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Opened {} as {spk}", path.display());
        Self::new(BufReader::new(file), spk, block_size)
    }
}

impl<R: Read> Source for RawSource<R> {
    fn output(&self) -> Speakers {
        self.spk
    }

    fn is_empty(&self) -> bool {
        self.eof
    }

    fn get_chunk(&mut self) -> Result<Chunk<'_>> {
        let mut filled = 0;
        while !self.eof && filled < self.block.len() {
            match self.reader.read(&mut self.block[filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => bail!(SourceError::Read {
                    position: self.position + filled as u64,
                    source,
                }),
            }
        }
        self.position += filled as u64;

        Ok(Chunk::raw(self.spk, &self.block[..filled]).with_eos(self.eof))
    }
}

/// Deterministic white noise of a fixed length.
///
/// Linear and float output is uniform in `[-1, 1)`; integer encodings get
/// uniformly random bytes. The same seed always produces the same stream.
pub struct NoiseSource {
    spk: Speakers,
    rng: StdRng,
    remaining: u64,
    block_frames: usize,
    linear: Vec<Sample>,
    raw: Vec<u8>,
}

impl NoiseSource {
    pub fn new(spk: Speakers, frames: u64, block_frames: usize, seed: u64) -> Result<Self> {
        spk.validate()?;
        if block_frames == 0 {
            bail!(SourceError::ZeroBlockSize);
        }

        Ok(Self {
            spk,
            rng: StdRng::seed_from_u64(seed),
            remaining: frames,
            block_frames,
            linear: Vec::new(),
            raw: Vec::new(),
        })
    }

    /// Frames still to be produced.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn fill_linear(rng: &mut StdRng, buf: &mut [Sample]) {
        buf.iter_mut()
            .for_each(|sample| *sample = rng.gen_range(-1.0..1.0));
    }
}

impl Source for NoiseSource {
    fn output(&self) -> Speakers {
        self.spk
    }

    fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    fn get_chunk(&mut self) -> Result<Chunk<'_>> {
        let frames = (self.block_frames as u64).min(self.remaining) as usize;
        self.remaining -= frames as u64;
        let eos = self.remaining == 0;
        if frames == 0 {
            return Ok(Chunk::dummy(self.spk).with_eos(eos));
        }

        let nch = self.spk.nch();
        let Some(frame_size) = self.spk.frame_size() else {
            self.linear.resize(frames * nch, 0.0);
            Self::fill_linear(&mut self.rng, &mut self.linear);
            let planes: Planes = self.linear.chunks_exact_mut(frames).collect();
            return Ok(Chunk::linear(self.spk, planes).with_eos(eos));
        };

        let len = frames * frame_size;
        self.raw.resize(len, 0);
        if self.spk.format.is_float() {
            self.linear.resize(frames * nch, 0.0);
            Self::fill_linear(&mut self.rng, &mut self.linear);
            let planes: ArrayVec<&[Sample], NCHANNELS> =
                self.linear.chunks_exact(frames).collect();
            linear_to_raw(self.spk.format, &planes, &mut self.raw, frames)?;
        } else {
            self.rng.fill_bytes(&mut self.raw);
        }
        Ok(Chunk::raw(self.spk, &self.raw).with_eos(eos))
    }
}
