use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use anyhow::{Result, bail};
use pcmflow::structs::speakers::{Format, Speakers};
use pcmflow_macros::{ToBytes, w64_chunk};

use crate::byteorder::WriteBytesLe;
use crate::impl_u16_enum;

// W64 GUIDs as defined in Sony Wave64 specification
pub const W64_RIFF_GUID: [u8; 16] = [
    0x72, 0x69, 0x66, 0x66, 0x2E, 0x91, 0xCF, 0x11, 0xA5, 0xD6, 0x28, 0xDB, 0x04, 0xC1, 0x00, 0x00,
];
pub const W64_WAVE_GUID: [u8; 16] = [
    0x77, 0x61, 0x76, 0x65, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];
pub const W64_DATA_GUID: [u8; 16] = [
    0x64, 0x61, 0x74, 0x61, 0xF3, 0xAC, 0xD3, 0x11, 0x8C, 0xD1, 0x00, 0xC0, 0x4F, 0x8E, 0xDB, 0x8A,
];

/// GUID plus 64-bit size.
const CHUNK_HEADER_SIZE: u64 = 24;

/// Chunks are aligned to 8 bytes.
fn padding(size: u64) -> usize {
    ((8 - size % 8) % 8) as usize
}

pub trait W64Chunk {
    fn chunk_guid(&self) -> &[u8; 16];
    fn chunk_data(&self) -> Vec<u8>;

    /// Writes the chunk with its header and padding, returning bytes written.
    fn write_chunk<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        let data = self.chunk_data();
        let size = CHUNK_HEADER_SIZE + data.len() as u64;
        let pad = padding(size);

        writer.write_all(self.chunk_guid())?;
        writer.write_all(&size.to_le_bytes())?;
        writer.write_all(&data)?;
        writer.write_all(&[0; 8][..pad])?;
        Ok(size + pad as u64)
    }
}

#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTag {
    Pcm = 1,
    IeeeFloat = 3,
}

impl_u16_enum!(FormatTag);

#[derive(Debug, ToBytes)]
#[w64_chunk(b"fmt ")]
pub struct FormatChunk {
    pub format_tag: FormatTag,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
}

impl FormatChunk {
    /// Wave64 stores little-endian samples only.
    pub fn new(spk: Speakers) -> Result<Self> {
        if spk.format.is_big_endian() {
            bail!("Wave64 cannot hold big-endian {}", spk.format);
        }
        let (Some(sample_size), Some(block_align)) = (spk.format.sample_size(), spk.frame_size())
        else {
            bail!("Wave64 cannot hold {} samples", spk.format);
        };
        let format_tag = match spk.format {
            Format::PcmFloat | Format::PcmDouble => FormatTag::IeeeFloat,
            _ => FormatTag::Pcm,
        };

        Ok(Self {
            format_tag,
            channels: spk.nch() as u16,
            sample_rate: spk.sample_rate,
            byte_rate: spk.sample_rate * block_align as u32,
            block_align: block_align as u16,
            bits_per_sample: (sample_size * 8) as u16,
        })
    }
}

/// Sony Wave64 file writer for raw PCM chunk data (.w64 extension)
pub struct W64Writer<W: Write + Seek> {
    writer: BufWriter<W>,
    file_size_position: u64,
    data_size_position: u64,
    data_written: u64,
}

impl<W: Write + Seek> W64Writer<W> {
    /// Writes the file header for `spk` and positions at the sample data.
    pub fn new(writer: W, spk: Speakers) -> Result<Self> {
        let fmt = FormatChunk::new(spk)?;
        let mut writer = BufWriter::new(writer);

        writer.write_all(&W64_RIFF_GUID)?;
        let file_size_position = writer.stream_position()?;
        writer.write_all(&0u64.to_le_bytes())?; // File size (to be updated later)
        writer.write_all(&W64_WAVE_GUID)?;

        fmt.write_chunk(&mut writer)?;

        writer.write_all(&W64_DATA_GUID)?;
        let data_size_position = writer.stream_position()?;
        writer.write_all(&0u64.to_le_bytes())?; // Data size (to be updated later)

        Ok(Self {
            writer,
            file_size_position,
            data_size_position,
            data_written: 0,
        })
    }

    /// Appends interleaved sample bytes.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Pads the data chunk, patches the size fields and returns the writer.
    pub fn finish(mut self) -> io::Result<W> {
        let data_chunk_size = CHUNK_HEADER_SIZE + self.data_written;
        self.writer.write_all(&[0; 8][..padding(data_chunk_size)])?;
        let end = self.writer.stream_position()?;

        self.writer.seek(SeekFrom::Start(self.data_size_position))?;
        self.writer.write_all(&data_chunk_size.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(self.file_size_position))?;
        self.writer.write_all(&end.to_le_bytes())?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        self.writer.into_inner().map_err(|e| e.into_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pcmflow::structs::speakers::{MODE_5_1, MODE_STEREO};
    use std::io::Cursor;

    const FMT_GUID_PREFIX: &[u8] = b"fmt ";

    fn u64_at(buf: &[u8], pos: usize) -> u64 {
        u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap())
    }

    #[test]
    fn format_chunk_fields() {
        let fmt = FormatChunk::new(Speakers::new(Format::Pcm24, MODE_5_1, 48000)).unwrap();
        assert_eq!(fmt.format_tag, FormatTag::Pcm);
        assert_eq!(fmt.channels, 6);
        assert_eq!(fmt.block_align, 18);
        assert_eq!(fmt.byte_rate, 48000 * 18);
        assert_eq!(fmt.bits_per_sample, 24);
        assert_eq!(&fmt.chunk_guid()[..4], FMT_GUID_PREFIX);
        assert_eq!(&fmt.chunk_guid()[4..], &W64_WAVE_GUID[4..]);

        let float = FormatChunk::new(Speakers::new(Format::PcmFloat, MODE_STEREO, 44100)).unwrap();
        assert_eq!(float.format_tag, FormatTag::IeeeFloat);
        assert_eq!(float.chunk_data().len(), 16);

        assert!(FormatChunk::new(Speakers::new(Format::Pcm16Be, MODE_STEREO, 48000)).is_err());
        assert!(FormatChunk::new(Speakers::new(Format::Linear, MODE_STEREO, 48000)).is_err());
    }

    #[test]
    fn header_and_sizes() -> Result<()> {
        let spk = Speakers::new(Format::Pcm16, MODE_STEREO, 48000);
        let mut writer = W64Writer::new(Cursor::new(Vec::new()), spk)?;
        writer.write(&[1, 2, 3, 4, 5, 6])?;
        assert_eq!(writer.data_written(), 6);
        let buffer = writer.finish()?.into_inner();

        assert_eq!(&buffer[0..16], &W64_RIFF_GUID);
        assert_eq!(&buffer[24..40], &W64_WAVE_GUID);
        assert_eq!(&buffer[40..44], FMT_GUID_PREFIX);
        assert_eq!(u64_at(&buffer, 56), 40);
        // RIFF header 40 + fmt chunk 40, then the data chunk
        assert_eq!(&buffer[80..96], &W64_DATA_GUID);
        assert_eq!(u64_at(&buffer, 96), 24 + 6);
        assert_eq!(&buffer[104..110], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.len(), 112);
        assert_eq!(u64_at(&buffer, 16), 112);
        Ok(())
    }
}
