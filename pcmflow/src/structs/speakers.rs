//! Stream format descriptors.
//!
//! A [`Speakers`] value tags every chunk with its sample encoding, channel
//! layout and sample rate. Channels are stored in a fixed order
//! (L, C, R, SL, SR, LFE) and a layout is a bitmask over that order, so the
//! position of a channel inside a chunk is the number of lower mask bits set.

use std::fmt::{self, Display};

use anyhow::{Result, bail};

use crate::utils::errors::FormatError;

/// Internal linear sample type.
pub type Sample = f64;

/// Maximum number of channels handled by any component.
pub const NCHANNELS: usize = 6;

pub const CH_L: u32 = 1 << 0;
pub const CH_C: u32 = 1 << 1;
pub const CH_R: u32 = 1 << 2;
pub const CH_SL: u32 = 1 << 3;
pub const CH_SR: u32 = 1 << 4;
pub const CH_LFE: u32 = 1 << 5;

const CH_ALL: u32 = CH_L | CH_C | CH_R | CH_SL | CH_SR | CH_LFE;

pub const MODE_MONO: u32 = CH_C;
pub const MODE_STEREO: u32 = CH_L | CH_R;
pub const MODE_3_0: u32 = CH_L | CH_C | CH_R;
pub const MODE_2_2: u32 = CH_L | CH_R | CH_SL | CH_SR;
pub const MODE_3_2: u32 = CH_L | CH_C | CH_R | CH_SL | CH_SR;
pub const MODE_5_1: u32 = MODE_3_2 | CH_LFE;

/// Channel names in buffer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    L = 0,
    C = 1,
    R = 2,
    SL = 3,
    SR = 4,
    Lfe = 5,
}

impl Channel {
    pub const ALL: [Channel; NCHANNELS] = [
        Channel::L,
        Channel::C,
        Channel::R,
        Channel::SL,
        Channel::SR,
        Channel::Lfe,
    ];

    pub const fn mask(self) -> u32 {
        1 << self as u32
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::L => "L",
            Channel::C => "C",
            Channel::R => "R",
            Channel::SL => "SL",
            Channel::SR => "SR",
            Channel::Lfe => "LFE",
        };
        f.write_str(name)
    }
}

/// Sample encoding of a stream.
///
/// `Linear` is the planar floating point hub format; every other variant is an
/// interleaved raw PCM encoding. Float and double encodings are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Linear,
    Pcm16,
    Pcm24,
    Pcm32,
    Pcm16Be,
    Pcm24Be,
    Pcm32Be,
    PcmFloat,
    PcmDouble,
}

impl Format {
    /// All raw PCM encodings, in dispatch table order.
    pub const PCM: [Format; 8] = [
        Format::Pcm16,
        Format::Pcm24,
        Format::Pcm32,
        Format::Pcm16Be,
        Format::Pcm24Be,
        Format::Pcm32Be,
        Format::PcmFloat,
        Format::PcmDouble,
    ];

    /// Bytes per sample of one channel, `None` for linear.
    pub const fn sample_size(self) -> Option<usize> {
        match self {
            Format::Linear => None,
            Format::Pcm16 | Format::Pcm16Be => Some(2),
            Format::Pcm24 | Format::Pcm24Be => Some(3),
            Format::Pcm32 | Format::Pcm32Be | Format::PcmFloat => Some(4),
            Format::PcmDouble => Some(8),
        }
    }

    pub const fn is_linear(self) -> bool {
        matches!(self, Format::Linear)
    }

    pub const fn is_pcm(self) -> bool {
        !self.is_linear()
    }

    pub const fn is_big_endian(self) -> bool {
        matches!(self, Format::Pcm16Be | Format::Pcm24Be | Format::Pcm32Be)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Format::PcmFloat | Format::PcmDouble)
    }

    /// Row of this encoding in the conversion dispatch tables.
    pub const fn pcm_index(self) -> Option<usize> {
        match self {
            Format::Linear => None,
            Format::Pcm16 => Some(0),
            Format::Pcm24 => Some(1),
            Format::Pcm32 => Some(2),
            Format::Pcm16Be => Some(3),
            Format::Pcm24Be => Some(4),
            Format::Pcm32Be => Some(5),
            Format::PcmFloat => Some(6),
            Format::PcmDouble => Some(7),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Format::Linear => "Linear",
            Format::Pcm16 => "PCM16",
            Format::Pcm24 => "PCM24",
            Format::Pcm32 => "PCM32",
            Format::Pcm16Be => "PCM16 BE",
            Format::Pcm24Be => "PCM24 BE",
            Format::Pcm32Be => "PCM32 BE",
            Format::PcmFloat => "PCM Float",
            Format::PcmDouble => "PCM Double",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable stream descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Speakers {
    pub format: Format,
    pub mask: u32,
    pub sample_rate: u32,
}

impl Default for Speakers {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl Speakers {
    /// Placeholder descriptor of an unconfigured filter.
    pub const UNKNOWN: Speakers = Speakers {
        format: Format::Linear,
        mask: 0,
        sample_rate: 0,
    };

    pub const fn new(format: Format, mask: u32, sample_rate: u32) -> Self {
        Self {
            format,
            mask,
            sample_rate,
        }
    }

    pub const fn nch(&self) -> usize {
        self.mask.count_ones() as usize
    }

    /// Same layout and rate with another encoding.
    pub const fn with_format(self, format: Format) -> Self {
        Self { format, ..self }
    }

    pub const fn with_mask(self, mask: u32) -> Self {
        Self { mask, ..self }
    }

    /// Bytes per interleaved frame, `None` for linear.
    pub const fn frame_size(&self) -> Option<usize> {
        match self.format.sample_size() {
            Some(size) => Some(size * self.nch()),
            None => None,
        }
    }

    /// Channels present in the layout, in buffer order.
    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(move |ch| self.mask & ch.mask() != 0)
    }

    /// Buffer position of `ch`, if present.
    pub fn position(&self, ch: Channel) -> Option<usize> {
        if self.mask & ch.mask() == 0 {
            return None;
        }
        Some((self.mask & (ch.mask() - 1)).count_ones() as usize)
    }

    /// Checks the layout and rate without looking at the encoding.
    pub fn validate(&self) -> Result<()> {
        if self.mask & !CH_ALL != 0 {
            bail!(FormatError::InvalidMask(self.mask));
        }
        check_channels(self.nch())?;
        if self.sample_rate == 0 {
            bail!(FormatError::InvalidSampleRate);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn mode_name(&self) -> String {
        match self.mask {
            MODE_MONO => "1/0".to_string(),
            MODE_STEREO => "2/0".to_string(),
            MODE_3_0 => "3/0".to_string(),
            MODE_2_2 => "2/2".to_string(),
            MODE_3_2 => "3/2".to_string(),
            MODE_5_1 => "3/2.1".to_string(),
            _ => self
                .channels()
                .map(|ch| ch.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl Display for Speakers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}Hz",
            self.format,
            self.mode_name(),
            self.sample_rate
        )
    }
}

/// Rejects channel counts outside `1..=NCHANNELS`.
pub fn check_channels(nch: usize) -> Result<()> {
    if nch == 0 || nch > NCHANNELS {
        bail!(FormatError::ChannelCount {
            actual: nch,
            max: NCHANNELS,
        });
    }
    Ok(())
}
