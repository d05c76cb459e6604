//! Categorised energy "ingredients" for a reporting year.
//!
//! The ingredients file (`data/output/ingredients.txt`) groups extracted
//! metrics by category:
//!
//! ```json
//! {"year": 2023,
//!  "metrics": {"renewable_energy_consumption": [...],
//!              "non_renewable_energy_consumption": [...]},
//!  "metadata": {...}}
//! ```
//!
//! Entries whose code is not a known code of their category are replaced by
//! a generic placeholder rather than dropped, so item counts are preserved.

use crate::compare::coerce_int;
use crate::error::ExtractError;
use crate::pipeline::store;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Codes accepted in the renewable list.
pub const RENEWABLE_CODES: [i64; 12] = [772, 773, 774, 775, 776, 777, 778, 779, 780, 781, 848, 849];

/// Codes accepted in the non-renewable list.
pub const NON_RENEWABLE_CODES: [i64; 5] = [783, 785, 786, 787, 789];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyCategory {
    Renewable,
    NonRenewable,
}

impl EnergyCategory {
    pub fn label(self) -> &'static str {
        match self {
            EnergyCategory::Renewable => "Renewable",
            EnergyCategory::NonRenewable => "Non-Renewable",
        }
    }

    pub fn known_codes(self) -> &'static [i64] {
        match self {
            EnergyCategory::Renewable => &RENEWABLE_CODES,
            EnergyCategory::NonRenewable => &NON_RENEWABLE_CODES,
        }
    }

    pub fn is_known(self, code: &Value) -> bool {
        coerce_int(code).is_some_and(|c| self.known_codes().iter().any(|&k| i128::from(k) == c))
    }

    fn generic_item(self) -> &'static str {
        match self {
            EnergyCategory::Renewable => "Generic Renewable",
            EnergyCategory::NonRenewable => "Generic Non-Renewable",
        }
    }
}

impl fmt::Display for EnergyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One energy-consumption entry tagged with its category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyItem {
    pub category: EnergyCategory,
    /// The code as written in the file (number or string).
    pub code: Value,
    pub item: String,
    pub value: Option<f64>,
    pub unit: String,
    pub page_number: u32,
    pub snippet: String,
}

impl EnergyItem {
    /// Placeholder for an entry whose code is not known for `category`.
    pub fn generic(category: EnergyCategory, code: Value) -> Self {
        Self {
            category,
            code,
            item: category.generic_item().to_string(),
            value: Some(0.0),
            unit: "units".to_string(),
            page_number: 0,
            snippet: "No specific data".to_string(),
        }
    }

    /// Build from a raw entry, substituting the placeholder for unknown codes.
    pub fn from_entry(category: EnergyCategory, entry: &Value) -> Result<Self, serde_json::Error> {
        let code = entry.get("code").cloned().unwrap_or(Value::Null);
        if !category.is_known(&code) {
            warn!("{} code {} is not recognised; using placeholder", category, code);
            return Ok(Self::generic(category, code));
        }
        let raw = RawEntry::deserialize(entry)?;
        Ok(Self {
            category,
            code,
            item: raw.item,
            value: raw.value,
            unit: raw.unit.unwrap_or_default(),
            page_number: raw.page_number.unwrap_or(0),
            snippet: raw.snippet.unwrap_or_default(),
        })
    }
}

impl fmt::Display for EnergyItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - ", self.item, self.category)?;
        match self.value {
            Some(v) => write!(f, "{v}")?,
            None => f.write_str("n/a")?,
        }
        write!(f, " {}", self.unit)
    }
}

#[derive(Deserialize)]
struct RawEntry {
    item: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    page_number: Option<u32>,
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct RawIngredients {
    year: Value,
    #[serde(default)]
    metrics: RawMetrics,
    #[serde(default)]
    metadata: Map<String, Value>,
}

#[derive(Default, Deserialize)]
struct RawMetrics {
    #[serde(default)]
    renewable_energy_consumption: Vec<Value>,
    #[serde(default)]
    non_renewable_energy_consumption: Vec<Value>,
}

/// Energy items of one reporting year, split by category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergyData {
    pub year: i64,
    pub metadata: Map<String, Value>,
    pub renewable: Vec<EnergyItem>,
    pub non_renewable: Vec<EnergyItem>,
}

impl EnergyData {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error as _;

        let raw = RawIngredients::deserialize(value)?;
        let year = coerce_int(&raw.year)
            .and_then(|y| i64::try_from(y).ok())
            .ok_or_else(|| serde_json::Error::custom(format!("invalid year {}", raw.year)))?;
        let tag = |category, entries: &[Value]| -> Result<Vec<EnergyItem>, serde_json::Error> {
            entries
                .iter()
                .map(|e| EnergyItem::from_entry(category, e))
                .collect()
        };
        Ok(Self {
            year,
            renewable: tag(
                EnergyCategory::Renewable,
                &raw.metrics.renewable_energy_consumption,
            )?,
            non_renewable: tag(
                EnergyCategory::NonRenewable,
                &raw.metrics.non_renewable_energy_consumption,
            )?,
            metadata: raw.metadata,
        })
    }

    /// Every item, renewable first.
    pub fn items(&self) -> impl Iterator<Item = &EnergyItem> {
        self.renewable.iter().chain(&self.non_renewable)
    }
}

/// Load and categorise an ingredients file.
pub fn load_ingredients(path: &Path) -> Result<EnergyData, ExtractError> {
    let value = store::load_json(path)?;
    let data = EnergyData::from_value(&value).map_err(|e| ExtractError::InvalidJson {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    info!(
        "Loaded {} renewable and {} non-renewable items for {}",
        data.renewable.len(),
        data.non_renewable.len(),
        data.year
    );
    Ok(data)
}
