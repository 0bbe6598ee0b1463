use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use pcmflow::structs::speakers::Speakers;

use super::command::Container;
use crate::wav::W64Writer;

pub fn create_path_with_extension(base_path: &Path, expected_ext: &str) -> PathBuf {
    let mut path = base_path.to_path_buf();
    match base_path.extension() {
        Some(existing_ext) if existing_ext == expected_ext => {}
        Some(_) => {
            let mut name = base_path.file_name().unwrap_or_default().to_os_string();
            name.push(".");
            name.push(expected_ext);
            path.set_file_name(name);
        }
        None => {
            path.set_extension(expected_ext);
        }
    }
    path
}

pub fn extension(container: Container) -> &'static str {
    match container {
        Container::Raw => "pcm",
        Container::W64 => "w64",
    }
}

pub enum AudioWriter {
    Raw(BufWriter<File>),
    W64(W64Writer<File>),
}

impl AudioWriter {
    pub fn create(path: &Path, container: Container, spk: Speakers) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        Ok(match container {
            Container::Raw => AudioWriter::Raw(BufWriter::new(file)),
            Container::W64 => AudioWriter::W64(W64Writer::new(file, spk)?),
        })
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match self {
            AudioWriter::Raw(w) => w.write_all(bytes)?,
            AudioWriter::W64(w) => w.write(bytes)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self {
            AudioWriter::Raw(mut w) => w.flush()?,
            AudioWriter::W64(w) => {
                debug!("Wave64 data chunk holds {} bytes", w.data_written());
                w.finish()?;
            }
        }
        Ok(())
    }
}
