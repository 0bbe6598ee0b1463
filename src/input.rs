use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};

/// File or stdin input, selected by the path "-".
pub struct InputReader {
    reader: Box<dyn Read>,
    len: Option<u64>,
}

impl InputReader {
    pub fn new<P: AsRef<Path>>(input_path: P) -> Result<Self> {
        let path = input_path.as_ref();

        if path.as_os_str() == "-" {
            return Ok(Self {
                reader: Box::new(io::stdin().lock()),
                len: None,
            });
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let len = file.metadata().ok().map(|m| m.len());
        Ok(Self {
            reader: Box::new(BufReader::new(file)),
            len,
        })
    }

    /// Total input size, unknown for pipes.
    pub fn size(&self) -> Option<u64> {
        self.len
    }

    /// Feeds the input to `callback` in pieces of at most `chunk_size`
    /// bytes until EOF or until the callback returns `Ok(false)`.
    pub fn process_chunks<F>(&mut self, chunk_size: usize, mut callback: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        let mut buffer = vec![0u8; chunk_size];

        loop {
            let bytes_read = match self.reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if !callback(&buffer[..bytes_read])? {
                break;
            }
        }

        Ok(())
    }
}

impl Read for InputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}
