// Copyright 2024-2026 xpu-kv-cache Contributors
// Licensed under the Apache License, Version 2.0

//! Device capability lookup table.
//!
//! The quantized-cache eligibility heuristic and the compressed-cache prompt
//! window are empirically tuned per hardware generation. They live here as
//! data keyed by device family name, with a built-in default table and a
//! TOML override path, rather than as family-name literals inside the policy
//! logic.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::cache::CacheError;

/// Broad memory behavior of a device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryClass {
    /// Shares memory with the host; treated as constrained.
    Integrated,
    /// Dedicated device memory.
    Discrete,
    /// Plain host memory, no accelerator.
    Host,
}

impl MemoryClass {
    /// Constrained devices get the cached-memory reclaim hint before growth.
    pub fn is_constrained(&self) -> bool {
        matches!(self, MemoryClass::Integrated)
    }

    pub fn is_accelerator(&self) -> bool {
        !matches!(self, MemoryClass::Host)
    }
}

/// Shape-dependent trigger for quantized-cache eligibility.
///
/// A family with no rule never selects a quantized cache by heuristic.
#[derive(Debug, Clone, Deserialize)]
pub struct QuantRule {
    /// Minimum number of KV heads.
    pub min_kv_heads: usize,
    /// Quantize when `num_heads / num_kv_heads` is at most this.
    #[serde(default)]
    pub max_group_ratio: Option<usize>,
    /// Quantize when batch size exceeds 1.
    #[serde(default)]
    pub when_batched: bool,
}

/// Capabilities of one device family.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCaps {
    pub memory_class: MemoryClass,
    /// Heuristic trigger for the quantized cache, if the family supports it.
    #[serde(default)]
    pub quantized_kv: Option<QuantRule>,
    /// Inclusive prompt-length window for the compressed cache variant.
    #[serde(default)]
    pub compress_prompt_range: Option<(usize, usize)>,
}

impl DeviceCaps {
    /// Capabilities of a plain host target: nothing quantizes, nothing
    /// compresses.
    pub fn host() -> Self {
        Self {
            memory_class: MemoryClass::Host,
            quantized_kv: None,
            compress_prompt_range: None,
        }
    }
}

/// Lookup from device family name to capabilities.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTable {
    families: HashMap<String, DeviceCaps>,
}

impl Default for CapabilityTable {
    /// Built-in table reproducing the tuned per-generation rules:
    /// integrated families quantize at a head-group ratio of at most 4 and
    /// compress prompts of 1800..=4500 tokens; discrete families quantize
    /// only for batched decoding.
    fn default() -> Self {
        let integrated = DeviceCaps {
            memory_class: MemoryClass::Integrated,
            quantized_kv: Some(QuantRule {
                min_kv_heads: 4,
                max_group_ratio: Some(4),
                when_batched: false,
            }),
            compress_prompt_range: Some((1800, 4500)),
        };
        let discrete = DeviceCaps {
            memory_class: MemoryClass::Discrete,
            quantized_kv: Some(QuantRule {
                min_kv_heads: 4,
                max_group_ratio: None,
                when_batched: true,
            }),
            compress_prompt_range: None,
        };

        let mut families = HashMap::new();
        for family in ["mtl", "lnl", "arl"] {
            families.insert(family.to_string(), integrated.clone());
        }
        for family in ["arc", "bmg"] {
            families.insert(family.to_string(), discrete.clone());
        }
        Self { families }
    }
}

impl CapabilityTable {
    /// Capabilities for `family`; unknown families fall back to host caps.
    pub fn lookup(&self, family: &str) -> DeviceCaps {
        self.families
            .get(family)
            .cloned()
            .unwrap_or_else(DeviceCaps::host)
    }

    pub fn contains(&self, family: &str) -> bool {
        self.families.contains_key(family)
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, CacheError> {
        toml::from_str(text).map_err(|e| CacheError::Config(e.to_string()))
    }

    /// Load a table from a TOML file, replacing the built-in defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
#[path = "capability_tests.rs"]
mod tests;
