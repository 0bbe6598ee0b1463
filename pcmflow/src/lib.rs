#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Streaming building blocks for uncompressed audio.
//!
//! ### Stream Model
//!
//! **Descriptor**: [`Speakers`](structs::speakers::Speakers) carries the sample
//! format, channel mask and sample rate of a stream.
//! **Unit**: [`Chunk`](structs::chunk::Chunk) is a borrowed view of either raw
//! bytes or per-channel linear samples.
//!
//! ### Channel Layout
//!
//! Up to six channels in canonical order: L, C, R, SL, SR, LFE. The position
//! of a channel in a chunk is its rank among the bits set in the mask.
//!
//! ### Sample Formats
//!
//! - Linear: normalised `f64`, nominal range `[-1, 1)`
//! - PCM 16/24/32 bit integers, little and big endian
//! - PCM 32 bit float and 64 bit double, little endian
//!
//! ## Quick Start
//!
//! Decode raw stereo PCM, downmix to mono and encode again:
//!
//! ```rust
//! use pcmflow::process::convert::Converter;
//! use pcmflow::process::mix::Mixer;
//! use pcmflow::process::source::RawSource;
//! use pcmflow::process::{FilterChain, FilterSource, Source};
//! use pcmflow::structs::speakers::{Format, MODE_MONO, MODE_STEREO, Speakers};
//!
//! let spk = Speakers::new(Format::Pcm16, MODE_STEREO, 48000);
//! let input: &[u8] = &[0x00, 0x40, 0x00, 0x40, 0x00, 0xC0, 0x00, 0xC0];
//! let source = RawSource::new(input, spk, 1024)?;
//!
//! let chain = FilterChain::new()
//!     .with(Converter::new(Format::Linear))
//!     .with(Mixer::new(MODE_MONO))
//!     .with(Converter::new(Format::Pcm16));
//! let mut stream = FilterSource::new(source, chain)?;
//!
//! let mut encoded = Vec::new();
//! loop {
//!     let chunk = stream.get_chunk()?;
//!     if let Some(bytes) = chunk.bytes() {
//!         encoded.extend_from_slice(bytes);
//!     }
//!     if chunk.eos {
//!         break;
//!     }
//! }
//! assert_eq!(stream.output().nch(), 1);
//! assert_eq!(encoded.len(), 4);
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Streaming processing components.
///
/// 1. **Sources** ([`process::source`]): Raw PCM files and generated noise.
///
/// 2. **Conversion** ([`process::convert`]): Raw PCM to linear and back.
///
/// 3. **Mixing** ([`process::mix`]): Matrix mixing between channel layouts.
///
/// 4. **Convolution** ([`process::convolve`]): FIR kernels applied per channel.
///
/// 5. **Scanning** ([`process::scan`]): Byte-wise syncword detection.
///
/// 6. **Comparison** ([`process::compare`]): Bit-exact and statistical diffing.
pub mod process;

/// Data structures shared by the processing components.
///
/// - **Speakers** ([`structs::speakers`]): Stream format descriptor
/// - **Chunks** ([`structs::chunk`]): Borrowed audio data units
/// - **Matrices** ([`structs::matrix`]): Mixing coefficients and downmix rules
/// - **FIR kernels** ([`structs::fir`]): Kernel instances and generators
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **PCM codecs** ([`utils::pcm`]): Per-sample encode and decode
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
