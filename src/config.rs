// src/config.rs
//
// Construction-time knobs shared by the pipeline and the builder.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while validating configuration. All of them are fatal and
/// surface before any record is read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("remote and local sequences must be the same length, got lengths {remote} and {local}")]
    MismatchedLength { remote: usize, local: usize },

    #[error("remote and local must be both single locations or both sequences, got {remote} and {local}")]
    InvalidArgumentType { remote: &'static str, local: &'static str },
}

/// How one caption is picked when a record carries several candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionSelection {
    /// Always the first candidate.
    #[default]
    First,
    /// A uniformly random candidate per sample.
    Random,
}

impl FromStr for CaptionSelection {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first" => Ok(CaptionSelection::First),
            "random" => Ok(CaptionSelection::Random),
            other => Err(ConfigError::InvalidConfig(format!(
                "Invalid caption selection: {other}. Must be one of [random, first]"
            ))),
        }
    }
}

impl fmt::Display for CaptionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptionSelection::First => write!(f, "first"),
            CaptionSelection::Random => write!(f, "random"),
        }
    }
}

/// Which crop policy the builder installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropType {
    /// Largest centered square, resized.
    #[default]
    Square,
    /// Randomly placed square, resized.
    Random,
    /// Nearest SDXL aspect bucket, randomly placed.
    AspectRatio,
    /// No crop.
    None,
}

impl CropType {
    /// Parse an optional crop name; `None` means no crop.
    pub fn parse_optional(s: Option<&str>) -> Result<Self, ConfigError> {
        match s {
            Some(s) => s.parse(),
            None => Ok(CropType::None),
        }
    }
}

impl FromStr for CropType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "square" => Ok(CropType::Square),
            "random" => Ok(CropType::Random),
            "aspect_ratio" => Ok(CropType::AspectRatio),
            "none" => Ok(CropType::None),
            other => Err(ConfigError::InvalidConfig(format!(
                "Invalid crop_type: {other}. Must be [\"square\", \"random\", \"aspect_ratio\", None]"
            ))),
        }
    }
}

/// One or more storage locations, as accepted by the builder for `remote` and `local`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locations {
    Single(String),
    Many(Vec<String>),
}

impl Locations {
    fn kind(&self) -> &'static str {
        match self {
            Locations::Single(_) => "single location",
            Locations::Many(_) => "sequence",
        }
    }
}

impl From<&str> for Locations {
    fn from(s: &str) -> Self {
        Locations::Single(s.to_string())
    }
}

impl From<String> for Locations {
    fn from(s: String) -> Self {
        Locations::Single(s)
    }
}

impl From<Vec<String>> for Locations {
    fn from(v: Vec<String>) -> Self {
        Locations::Many(v)
    }
}

impl From<Vec<&str>> for Locations {
    fn from(v: Vec<&str>) -> Self {
        Locations::Many(v.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Locations {
    fn from(v: &[&str]) -> Self {
        Locations::Many(v.iter().map(|s| s.to_string()).collect())
    }
}

/// Normalize `remote` / `local` into parallel `(remote, local)` pairs.
pub fn pair_locations(
    remote: Locations,
    local: Locations,
) -> Result<Vec<(String, String)>, ConfigError> {
    match (remote, local) {
        (Locations::Single(r), Locations::Single(l)) => Ok(vec![(r, l)]),
        (Locations::Many(r), Locations::Many(l)) => {
            if r.len() != l.len() {
                return Err(ConfigError::MismatchedLength { remote: r.len(), local: l.len() });
            }
            Ok(r.into_iter().zip(l).collect())
        }
        (r, l) => Err(ConfigError::InvalidArgumentType { remote: r.kind(), local: l.kind() }),
    }
}
