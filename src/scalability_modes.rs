//! Scalability mode of an encoding, like `L1T3` or `S3T3`.

#[cfg(test)]
mod tests;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use std::num::NonZeroU8;
use std::str::FromStr;
use thiserror::Error;

static SCALABILITY_MODE_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^([LS])([1-9][0-9]?)T([1-9][0-9]?)(_KEY)?(_SHIFT)?$").ok());

/// Number of spatial and temporal layers in an RTP stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ScalabilityMode {
    simulcast: bool,
    spatial_layers: NonZeroU8,
    temporal_layers: NonZeroU8,
    ksvc: bool,
    shift: bool,
}

/// Error that caused [`ScalabilityMode`] parsing error.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ParseScalabilityModeError {
    /// Invalid input string
    #[error("Invalid input string")]
    InvalidInput,
}

impl ScalabilityMode {
    /// Simulcast-style mode `S{spatial}T{temporal}` as used for consumers of simulcast producers.
    #[must_use]
    pub fn simulcast(spatial_layers: NonZeroU8, temporal_layers: NonZeroU8) -> Self {
        Self {
            simulcast: true,
            spatial_layers,
            temporal_layers,
            ksvc: false,
            shift: false,
        }
    }

    #[must_use]
    pub fn spatial_layers(&self) -> NonZeroU8 {
        self.spatial_layers
    }

    #[must_use]
    pub fn temporal_layers(&self) -> NonZeroU8 {
        self.temporal_layers
    }

    /// K-SVC (`_KEY` suffix).
    #[must_use]
    pub fn ksvc(&self) -> bool {
        self.ksvc
    }
}

impl FromStr for ScalabilityMode {
    type Err = ParseScalabilityModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = SCALABILITY_MODE_REGEX
            .as_ref()
            .and_then(|regex| regex.captures(s))
            .ok_or(ParseScalabilityModeError::InvalidInput)?;

        let layers = |index: usize| {
            captures
                .get(index)
                .and_then(|m| m.as_str().parse::<NonZeroU8>().ok())
                .ok_or(ParseScalabilityModeError::InvalidInput)
        };

        Ok(Self {
            simulcast: captures.get(1).map(|m| m.as_str()) == Some("S"),
            spatial_layers: layers(2)?,
            temporal_layers: layers(3)?,
            ksvc: captures.get(4).is_some(),
            shift: captures.get(5).is_some(),
        })
    }
}

impl fmt::Display for ScalabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}T{}{}{}",
            if self.simulcast { "S" } else { "L" },
            self.spatial_layers,
            self.temporal_layers,
            if self.ksvc { "_KEY" } else { "" },
            if self.shift { "_SHIFT" } else { "" },
        )
    }
}

impl Serialize for ScalabilityMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScalabilityMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = Cow::<str>::deserialize(deserializer)?;
        string
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid scalability mode {}", string)))
    }
}
