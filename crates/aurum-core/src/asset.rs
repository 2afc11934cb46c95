//! Provider and asset identifiers.
//!
//! Wire names are stable: they appear in persisted records and in the
//! outbound subscriber stream, so renaming a variant here is a breaking
//! change for stored data.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Streaming forex/metals WebSocket feed.
    Eodhd,
    /// REST quote polling.
    TwelveData,
    /// Scraped dealer page. Wire name stays "massive" for compatibility
    /// with records written before the source was switched.
    #[serde(rename = "massive")]
    Naugold,
}

impl Provider {
    /// All providers that feed the live tick pipeline.
    pub const LIVE: [Provider; 3] = [Provider::Eodhd, Provider::TwelveData, Provider::Naugold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eodhd => "eodhd",
            Self::TwelveData => "twelve_data",
            Self::Naugold => "massive",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eodhd" => Ok(Self::Eodhd),
            "twelve_data" => Ok(Self::TwelveData),
            "massive" | "naugold" => Ok(Self::Naugold),
            other => Err(CoreError::UnknownProvider(other.to_string())),
        }
    }
}

/// Tracked asset: precious metals quoted in USD plus FX pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Gold,
    Silver,
    Platinum,
    Palladium,
    UsdKrw,
    UsdJpy,
    JpyKrw,
    EurKrw,
    BtcUsd,
}

impl Asset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gold => "gold",
            Self::Silver => "silver",
            Self::Platinum => "platinum",
            Self::Palladium => "palladium",
            Self::UsdKrw => "usd_krw",
            Self::UsdJpy => "usd_jpy",
            Self::JpyKrw => "jpy_krw",
            Self::EurKrw => "eur_krw",
            Self::BtcUsd => "btc_usd",
        }
    }

    /// Metals priced per troy ounce.
    pub fn is_metal(&self) -> bool {
        matches!(
            self,
            Self::Gold | Self::Silver | Self::Platinum | Self::Palladium
        )
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Asset {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gold" => Ok(Self::Gold),
            "silver" => Ok(Self::Silver),
            "platinum" => Ok(Self::Platinum),
            "palladium" => Ok(Self::Palladium),
            "usd_krw" => Ok(Self::UsdKrw),
            "usd_jpy" => Ok(Self::UsdJpy),
            "jpy_krw" => Ok(Self::JpyKrw),
            "eur_krw" => Ok(Self::EurKrw),
            "btc_usd" => Ok(Self::BtcUsd),
            other => Err(CoreError::UnknownAsset(other.to_string())),
        }
    }
}
