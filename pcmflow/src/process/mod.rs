//! Streaming processing components.
//!
//! Audio flows as [`Chunk`]s pulled from a [`Source`], optionally through one
//! or more [`Filter`]s, into a consumer. Every call is synchronous and a
//! returned chunk borrows from the object that produced it.

use anyhow::{Result, bail};
use log::debug;

use crate::structs::chunk::Chunk;
use crate::structs::speakers::Speakers;
use crate::utils::errors::FilterError;

/// Stream comparison and statistics.
///
/// Provides the [`Comparator`](compare::Comparator) for bit-exact comparison
/// of two sources and [`diff`](compare::Comparator::diff) level statistics.
pub mod compare;

/// Format conversion between linear samples and raw PCM encodings.
///
/// Provides [`raw_to_linear`](convert::raw_to_linear),
/// [`linear_to_raw`](convert::linear_to_raw) and the
/// [`Converter`](convert::Converter) filter.
pub mod convert;

/// FIR convolution filter driven by a [`FirGen`](crate::structs::fir::FirGen).
pub mod convolve;

/// Matrix mixing kernels and the [`Mixer`](mix::Mixer) filter.
pub mod mix;

/// Multi-pattern syncword scanning over byte streams.
pub mod scan;

/// Raw file and noise sources.
pub mod source;

/// Producer of chunks.
pub trait Source {
    /// Format of the chunks currently produced.
    fn output(&self) -> Speakers;

    /// True when no more data will be produced.
    fn is_empty(&self) -> bool;

    /// Returns the next chunk. A dummy chunk means no data is available yet;
    /// `Err` is a hard failure.
    fn get_chunk(&mut self) -> Result<Chunk<'_>>;
}

impl<S: Source + ?Sized> Source for &mut S {
    fn output(&self) -> Speakers {
        (**self).output()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn get_chunk(&mut self) -> Result<Chunk<'_>> {
        (**self).get_chunk()
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn output(&self) -> Speakers {
        (**self).output()
    }

    fn is_empty(&self) -> bool {
        (**self).is_empty()
    }

    fn get_chunk(&mut self) -> Result<Chunk<'_>> {
        (**self).get_chunk()
    }
}

/// Chunk transformer.
///
/// A filter is configured for one input format with [`set_input`] and then
/// consumes whole chunks of that format. The returned chunk borrows either
/// the filter's own buffers or the input chunk's.
///
/// [`set_input`]: Filter::set_input
pub trait Filter {
    /// Configures the filter. On error the previous configuration is kept.
    fn set_input(&mut self, spk: Speakers) -> Result<()>;

    fn input(&self) -> Speakers;

    fn output(&self) -> Speakers;

    fn process<'a>(&'a mut self, chunk: Chunk<'a>) -> Result<Chunk<'a>>;

    /// Drops internal state without changing the configuration.
    fn reset(&mut self);
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn set_input(&mut self, spk: Speakers) -> Result<()> {
        (**self).set_input(spk)
    }

    fn input(&self) -> Speakers {
        (**self).input()
    }

    fn output(&self) -> Speakers {
        (**self).output()
    }

    fn process<'a>(&'a mut self, chunk: Chunk<'a>) -> Result<Chunk<'a>> {
        (**self).process(chunk)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Rejects chunks whose descriptor differs from the configured input or
/// whose payload does not fit the descriptor.
pub(crate) fn check_input(input: Speakers, chunk: &Chunk) -> Result<()> {
    if input == Speakers::UNKNOWN {
        bail!(FilterError::NotConfigured);
    }
    if chunk.spk != input {
        bail!(FilterError::FormatMismatch {
            expected: input,
            found: chunk.spk,
        });
    }
    chunk.validate()
}

/// Source adapter running every chunk of `source` through `filter`.
///
/// The filter is configured from the source format at construction and
/// reconfigured whenever a chunk arrives with a different descriptor.
pub struct FilterSource<S, F> {
    source: S,
    filter: F,
}

impl<S: Source, F: Filter> FilterSource<S, F> {
    pub fn new(source: S, mut filter: F) -> Result<Self> {
        let spk = source.output();
        if filter.input() != spk {
            filter.set_input(spk)?;
        }
        Ok(Self { source, filter })
    }

    pub fn filter(&self) -> &F {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut F {
        &mut self.filter
    }

    pub fn into_inner(self) -> (S, F) {
        (self.source, self.filter)
    }
}

impl<S: Source, F: Filter> Source for FilterSource<S, F> {
    fn output(&self) -> Speakers {
        self.filter.output()
    }

    fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    fn get_chunk(&mut self) -> Result<Chunk<'_>> {
        let chunk = self.source.get_chunk()?;
        if chunk.spk != self.filter.input() {
            debug!("Reconfiguring filter for {}", chunk.spk);
            self.filter.set_input(chunk.spk)?;
        }
        self.filter.process(chunk)
    }
}

/// Ordered list of filters acting as a single filter.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    input: Speakers,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a filter. The chain must be configured again afterwards.
    pub fn push<F: Filter + 'static>(&mut self, filter: F) {
        self.filters.push(Box::new(filter));
        self.input = Speakers::UNKNOWN;
    }

    pub fn with<F: Filter + 'static>(mut self, filter: F) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for FilterChain {
    fn set_input(&mut self, spk: Speakers) -> Result<()> {
        let mut current = spk;
        for filter in self.filters.iter_mut() {
            if filter.input() != current {
                filter.set_input(current)?;
            }
            current = filter.output();
        }
        self.input = spk;
        Ok(())
    }

    fn input(&self) -> Speakers {
        self.input
    }

    fn output(&self) -> Speakers {
        self.filters.last().map_or(self.input, |filter| filter.output())
    }

    fn process<'a>(&'a mut self, chunk: Chunk<'a>) -> Result<Chunk<'a>> {
        check_input(self.input, &chunk)?;
        let mut chunk = chunk;
        for filter in self.filters.iter_mut() {
            chunk = filter.process(chunk)?;
        }
        Ok(chunk)
    }

    fn reset(&mut self) {
        self.filters.iter_mut().for_each(|filter| filter.reset());
    }
}
