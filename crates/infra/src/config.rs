//! Ledger configuration.
//!
//! Loaded in layers: built-in defaults, then environment variables prefixed
//! with `STORELEDGER__` (e.g. `STORELEDGER__OVERSELL_POLICY=reject`).

use config::{Config, Environment, Source};
use serde::{Deserialize, Serialize};

use storeledger_inventory::{MovementType, OversellPolicy};

pub const ENV_PREFIX: &str = "STORELEDGER";

/// Log tag used for layaway stock movements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayawayTag {
    /// Log layaways as point-of-sale sales.
    #[default]
    SaleAtPos,
    /// Log layaways under their own `Layaway` movement type.
    Dedicated,
}

impl LayawayTag {
    pub fn movement_type(self) -> MovementType {
        match self {
            LayawayTag::SaleAtPos => MovementType::SaleAtPos,
            LayawayTag::Dedicated => MovementType::Layaway,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub oversell_policy: OversellPolicy,
    pub layaway_tag: LayawayTag,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load ledger configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl LedgerConfig {
    /// Defaults overlaid with `STORELEDGER__*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Environment::with_prefix(ENV_PREFIX).separator("__"))
    }

    /// Defaults overlaid with an arbitrary source.
    pub fn load<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let settings = Config::builder()
            .set_default("oversell_policy", "clamp")?
            .set_default("layaway_tag", "sale_at_pos")?
            .add_source(source)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
