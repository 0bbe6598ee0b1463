use crate::structs::speakers::{Format, Speakers};

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err.into());
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    #[error("{0} is not a raw PCM encoding")]
    NotPcm(Format),

    #[error("Channel count must be between 1 and {max}. Got {actual}")]
    ChannelCount { actual: usize, max: usize },

    #[error("Channel mask {0:#04X} contains unknown channel bits")]
    InvalidMask(u32),

    #[error("Raw buffer too short: {frames} frames need {needed} bytes, got {actual}")]
    RawBufferTooShort {
        frames: usize,
        needed: usize,
        actual: usize,
    },

    #[error("Channel {channel} buffer holds {actual} samples, {needed} required")]
    ChannelBufferTooShort {
        channel: usize,
        needed: usize,
        actual: usize,
    },

    #[error("Sample rate must be non-zero")]
    InvalidSampleRate,

    #[error("{spk} chunk carries {planes} planes")]
    PlaneCount { spk: Speakers, planes: usize },

    #[error("{spk} chunk carries {found} data")]
    DataKind { spk: Speakers, found: &'static str },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Unsupported input format: {0}")]
    UnsupportedInput(Speakers),

    #[error("Cannot convert {from} to {to}")]
    UnsupportedConversion { from: Format, to: Format },

    #[error("Chunk format {found} does not match filter input {expected}")]
    FormatMismatch { expected: Speakers, found: Speakers },

    #[error("In-place mixing cannot produce {outputs} channels from {inputs}")]
    InPlaceExpansion { inputs: usize, outputs: usize },

    #[error("Output mask {0:#04X} is not a valid channel layout")]
    InvalidOutputMask(u32),

    #[error("Filter input is not configured")]
    NotConfigured,
}

#[derive(thiserror::Error, Debug)]
pub enum FirError {
    #[error("Sample rate must be non-zero")]
    InvalidSampleRate,

    #[error("Kernel was designed for {expected} Hz, requested {requested} Hz")]
    SampleRateMismatch { expected: u32, requested: u32 },

    #[error("Custom kernel centre tap {center} is outside kernel of length {len}")]
    CenterOutOfRange { center: usize, len: usize },

    #[error("Custom kernel must not be empty")]
    EmptyKernel,

    #[error("Kernel allocation of {0} taps failed")]
    Alloc(usize),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Sync pattern index must be < {max}. Got {index}")]
    PatternIndex { index: usize, max: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Raw source cannot produce {0}")]
    UnsupportedFormat(Speakers),

    #[error("Block size must be non-zero")]
    ZeroBlockSize,

    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read failed after {position} bytes: {source}")]
    Read {
        position: u64,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CompareError {
    #[error("Stream formats differ: {test} vs reference {reference}")]
    FormatMismatch { test: Speakers, reference: Speakers },

    #[error("Stream format changed from {from} to {to} at unit {position}")]
    FormatChanged {
        from: Speakers,
        to: Speakers,
        position: u64,
    },

    #[error("Data differs at unit {position}, channel {channel}: {test} vs reference {reference}")]
    DataMismatch {
        position: u64,
        channel: usize,
        test: f64,
        reference: f64,
    },

    #[error("Stream lengths differ: {test} vs reference {reference} units")]
    LengthMismatch { test: u64, reference: u64 },

    #[error("Statistics require linear streams, got {0}")]
    NotLinear(Speakers),
}
