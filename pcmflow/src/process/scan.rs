//! Syncword scanning over fragmented byte streams.
//!
//! The scanner shifts bytes one at a time into a 4-byte window and, once the
//! window is full, tests it against every active pattern after each byte. The
//! window survives between calls, so a syncword split across buffers at any
//! offset is still found. Scanning stops right after the byte that completed
//! a match; the caller decides how to continue from there.
//!
//! # Example
//!
//! ```rust
//! use pcmflow::process::scan::{StandardSync, SyncScanner};
//!
//! let mut scanner = SyncScanner::with_standard_patterns();
//! let stream = [0x00, 0x11, 0x0B, 0x77, 0x12, 0x34];
//!
//! // AC3 is matched once 0x0B77 reaches the top half of the window.
//! assert_eq!(scanner.scan(&stream[..3]), 3);
//! assert_eq!(scanner.scan(&stream[3..]), 3);
//! assert_ne!(scanner.matched() & StandardSync::Ac3Be.bit(), 0);
//! ```

use std::fmt::{self, Display};

use anyhow::{Result, bail};
use log::trace;

use crate::utils::errors::ScanError;

/// Number of pattern slots.
pub const MAX_PATTERNS: usize = 32;

/// Last four bytes seen, most recent in the lowest byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncWindow {
    bytes: u32,
    count: u8,
}

impl SyncWindow {
    pub const fn new() -> Self {
        Self { bytes: 0, count: 0 }
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.bytes = (self.bytes << 8) | byte as u32;
        if self.count < 4 {
            self.count += 1;
        }
    }

    pub fn is_full(&self) -> bool {
        self.count == 4
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Bytes held, 0 to 4.
    pub fn len(&self) -> usize {
        self.count as usize
    }

    /// Window contents as a big-endian word.
    pub fn value(&self) -> u32 {
        self.bytes
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Syncword with a mask selecting the bits that must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPattern {
    pub syncword: u32,
    pub mask: u32,
}

impl SyncPattern {
    pub const fn new(syncword: u32, mask: u32) -> Self {
        Self { syncword, mask }
    }

    pub const fn exact(syncword: u32) -> Self {
        Self::new(syncword, u32::MAX)
    }

    #[inline]
    pub const fn matches(&self, window: u32) -> bool {
        (window & self.mask) == (self.syncword & self.mask)
    }
}

/// Well-known bitstream header syncwords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardSync {
    Ac3Be,
    Ac3Le,
    Dts16Be,
    Dts16Le,
    Dts14Be,
    Dts14Le,
    Mpa,
    Spdif,
    TrueHd,
}

impl StandardSync {
    pub const ALL: [StandardSync; 9] = [
        StandardSync::Ac3Be,
        StandardSync::Ac3Le,
        StandardSync::Dts16Be,
        StandardSync::Dts16Le,
        StandardSync::Dts14Be,
        StandardSync::Dts14Le,
        StandardSync::Mpa,
        StandardSync::Spdif,
        StandardSync::TrueHd,
    ];

    /// Slot used by [`SyncScanner::with_standard_patterns`].
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn bit(self) -> u32 {
        1 << self.index()
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn pattern(self) -> SyncPattern {
        match self {
            StandardSync::Ac3Be => SyncPattern::new(0x0B77_0000, 0xFFFF_0000),
            StandardSync::Ac3Le => SyncPattern::new(0x770B_0000, 0xFFFF_0000),
            StandardSync::Dts16Be => SyncPattern::exact(0x7FFE_8001),
            StandardSync::Dts16Le => SyncPattern::exact(0xFE7F_0180),
            StandardSync::Dts14Be => SyncPattern::exact(0x1FFF_E800),
            StandardSync::Dts14Le => SyncPattern::exact(0xFF1F_00E8),
            // 11-bit frame sync
            StandardSync::Mpa => SyncPattern::new(0xFFE0_0000, 0xFFE0_0000),
            // IEC 61937 Pa/Pb preamble, little-endian words
            StandardSync::Spdif => SyncPattern::exact(0x72F8_1F4E),
            // Last bit distinguishes FBA (TrueHD) from FBB (MLP)
            StandardSync::TrueHd => SyncPattern::new(0xF872_6FBA, 0xFFFF_FFFE),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            StandardSync::Ac3Be => "AC3",
            StandardSync::Ac3Le => "AC3 (LE)",
            StandardSync::Dts16Be => "DTS 16-bit",
            StandardSync::Dts16Le => "DTS 16-bit (LE)",
            StandardSync::Dts14Be => "DTS 14-bit",
            StandardSync::Dts14Le => "DTS 14-bit (LE)",
            StandardSync::Mpa => "MPEG Audio",
            StandardSync::Spdif => "SPDIF",
            StandardSync::TrueHd => "TrueHD/MLP",
        }
    }
}

impl Display for StandardSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one scan call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Bytes consumed, up to and including the byte completing a match.
    pub consumed: usize,
    /// Bitmask of all patterns matching the window, 0 if none.
    pub matched: u32,
}

impl ScanResult {
    pub fn is_match(&self) -> bool {
        self.matched != 0
    }
}

/// Multi-pattern syncword scanner.
#[derive(Debug, Clone)]
pub struct SyncScanner {
    patterns: [SyncPattern; MAX_PATTERNS],
    active: u32,
    window: SyncWindow,
    matched: u32,
}

impl Default for SyncScanner {
    fn default() -> Self {
        Self {
            patterns: [SyncPattern::new(0, 0); MAX_PATTERNS],
            active: 0,
            window: SyncWindow::new(),
            matched: 0,
        }
    }
}

impl SyncScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner with every [`StandardSync`] pattern in its own slot.
    pub fn with_standard_patterns() -> Self {
        let mut scanner = Self::default();
        for sync in StandardSync::ALL {
            scanner.patterns[sync.index()] = sync.pattern();
            scanner.active |= sync.bit();
        }
        scanner
    }

    fn check_index(index: usize) -> Result<()> {
        if index >= MAX_PATTERNS {
            bail!(ScanError::PatternIndex {
                index,
                max: MAX_PATTERNS,
            });
        }
        Ok(())
    }

    /// Installs `pattern` in slot `index` and activates it. The window is kept.
    pub fn set(&mut self, index: usize, pattern: SyncPattern) -> Result<()> {
        Self::check_index(index)?;
        self.patterns[index] = pattern;
        self.active |= 1 << index;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<SyncPattern> {
        (index < MAX_PATTERNS && self.active & (1 << index) != 0).then(|| self.patterns[index])
    }

    pub fn clear(&mut self, index: usize) -> Result<()> {
        Self::check_index(index)?;
        self.active &= !(1 << index);
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.active = 0;
    }

    /// Bitmask of active slots.
    pub fn active(&self) -> u32 {
        self.active
    }

    /// Forgets buffered bytes and the last match.
    pub fn reset(&mut self) {
        self.window.clear();
        self.matched = 0;
    }

    pub fn window(&self) -> SyncWindow {
        self.window
    }

    /// Patterns matched by the last [`scan`](Self::scan) call.
    pub fn matched(&self) -> u32 {
        self.matched
    }

    /// Scans with the internal window and returns the bytes consumed.
    pub fn scan(&mut self, data: &[u8]) -> usize {
        let mut window = self.window;
        let result = self.scan_window(&mut window, data);
        self.window = window;
        self.matched = result.matched;
        result.consumed
    }

    /// Scans with a caller-owned window, leaving the scanner untouched.
    pub fn scan_window(&self, window: &mut SyncWindow, data: &[u8]) -> ScanResult {
        for (i, &byte) in data.iter().enumerate() {
            window.push(byte);
            if !window.is_full() {
                continue;
            }
            let matched = self.match_word(window.value());
            if matched != 0 {
                trace!("Sync {:08X} matched patterns {matched:#b}", window.value());
                return ScanResult {
                    consumed: i + 1,
                    matched,
                };
            }
        }
        ScanResult {
            consumed: data.len(),
            matched: 0,
        }
    }

    #[inline]
    fn match_word(&self, word: u32) -> u32 {
        let mut matched = 0;
        let mut active = self.active;
        while active != 0 {
            let index = active.trailing_zeros() as usize;
            if self.patterns[index].matches(word) {
                matched |= 1 << index;
            }
            active &= active - 1;
        }
        matched
    }
}
