use anyhow::{Context, Result};
use ethers::types::Address;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMeta {
    pub id: String,
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMeta {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub color: String,
}

/// Yield-farming pool wiring: the pool contract and the tokens it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YfPoolConfig {
    pub name: String,
    pub address: Address,
    pub tokens: Vec<Address>,
}

fn market(id: &str, name: &str, icon: &str) -> (String, MarketMeta) {
    (
        id.to_string(),
        MarketMeta {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
        },
    )
}

fn pool(id: &str, name: &str, icon: &str, color: &str) -> (String, PoolMeta) {
    (
        id.to_string(),
        PoolMeta {
            id: id.to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
        },
    )
}

lazy_static! {
    /// Lending markets keyed by `protocolId`.
    pub static ref MARKETS: HashMap<String, MarketMeta> = HashMap::from([
        market("compound/v2", "Compound", "compound"),
        market("aave/v2", "AAVE", "static/aave"),
        market("cream/v2", "C.R.E.A.M Finance", "cream_finance"),
        market("aave-polygon", "AAVE Polygon", "static/aave_polygon_grayed"),
    ]);

    /// Underlying assets keyed by `underlyingSymbol`.
    pub static ref POOLS: HashMap<String, PoolMeta> = HashMap::from([
        pool("USDC", "USD Coin", "token-usdc", "var(--theme-blue-color)"),
        pool("DAI", "Dai Stablecoin", "token-dai", "var(--theme-yellow-color)"),
        pool("USDT", "Tether USD", "token-usdt", "#50af95"),
        pool("GUSD", "Gemini dollar", "token-gusd", "#00dcfa"),
    ]);
}

/// Immutable lookup tables joined with API metadata.
///
/// Built once at startup and shared behind an `Arc`. A missing key leaves
/// the joined field absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTables {
    #[serde(default)]
    pub markets: HashMap<String, MarketMeta>,
    #[serde(default)]
    pub pools: HashMap<String, PoolMeta>,
    #[serde(default)]
    pub yf_pools: Vec<YfPoolConfig>,
}

impl ReferenceTables {
    pub fn builtin() -> Self {
        Self {
            markets: MARKETS.clone(),
            pools: POOLS.clone(),
            yf_pools: Vec::new(),
        }
    }

    /// Builtin tables with entries from `path` added or replaced.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read reference tables {}", path.display()))?;
        let overrides: ReferenceTables = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid reference tables {}", path.display()))?;

        let mut tables = Self::builtin();
        tables.markets.extend(overrides.markets);
        tables.pools.extend(overrides.pools);
        tables.yf_pools = overrides.yf_pools;
        Ok(tables)
    }

    pub fn market(&self, protocol_id: &str) -> Option<&MarketMeta> {
        self.markets.get(protocol_id)
    }

    pub fn pool(&self, underlying_symbol: &str) -> Option<&PoolMeta> {
        self.pools.get(underlying_symbol)
    }
}
