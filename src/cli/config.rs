use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use pcmflow::process::mix::Mixer;
use pcmflow::structs::matrix::{Matrix, MixLevels};
use serde::{Deserialize, Deserializer};

/// Linear gain, written in YAML either as a number or as a decibel string
/// such as `-3dB`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level(pub f64);

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Gain(f64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Gain(gain) => Ok(Level(gain)),
            Repr::Text(text) => {
                let db = text
                    .trim()
                    .strip_suffix("dB")
                    .or_else(|| text.trim().strip_suffix("db"))
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid level {text:?}")))?;
                let db: f64 = db.trim().parse().map_err(serde::de::Error::custom)?;
                Ok(Level(10f64.powf(db / 20.0)))
            }
        }
    }
}

/// Mixing profile loaded with `convert --mix-config`.
///
/// ```yaml
/// clev: -3dB
/// slev: 0.5
/// lfelev: 0
/// normalize: false
/// matrix:            # optional, one row per input channel
///   - [1.0, 0.0]
///   - [0.0, 1.0]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MixConfig {
    pub clev: Level,
    pub slev: Level,
    pub lfelev: Level,
    pub normalize: bool,
    pub matrix: Option<Vec<Vec<f64>>>,
}

impl Default for MixConfig {
    fn default() -> Self {
        let levels = MixLevels::default();
        Self {
            clev: Level(levels.clev),
            slev: Level(levels.slev),
            lfelev: Level(levels.lfelev),
            normalize: levels.normalize,
            matrix: None,
        }
    }
}

impl MixConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mix config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid mix config {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    pub fn levels(&self) -> MixLevels {
        MixLevels {
            clev: self.clev.0,
            slev: self.slev.0,
            lfelev: self.lfelev.0,
            normalize: self.normalize,
        }
    }

    /// Explicit matrix checked against the channel counts of the mix.
    pub fn matrix(&self, nin: usize, nout: usize) -> Result<Option<Matrix>> {
        let Some(rows) = &self.matrix else {
            return Ok(None);
        };
        if rows.len() != nin {
            bail!("Mix matrix has {} rows, input has {nin} channels", rows.len());
        }

        let mut matrix = Matrix::zero();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != nout {
                bail!(
                    "Mix matrix row {i} has {} columns, output has {nout} channels",
                    row.len()
                );
            }
            matrix[i][..nout].copy_from_slice(row);
        }
        Ok(Some(matrix))
    }

    pub fn apply(&self, mixer: &mut Mixer, nin: usize, nout: usize) -> Result<()> {
        match self.matrix(nin, nout)? {
            Some(matrix) => mixer.set_matrix(matrix),
            None => mixer.set_levels(self.levels()),
        }
        Ok(())
    }
}
