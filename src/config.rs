//! TOML configuration for a full dataset pipeline run.
//!
//! Every section is optional; an empty file yields [`PipelineConfig::default`].
//!
//! ```toml
//! label_name = "energy"
//! elements = ["H", "C", "O"]
//! cutoff = 4.0
//!
//! [expansion]
//! num_centers = 50
//!
//! [cache]
//! graph_path = "cache/dgl_graph.bin"
//! attr_path = "cache/graph_attr.pt"
//!
//! [loader]
//! batch_size = 64
//! num_workers = 2
//!
//! [split]
//! train = 0.8
//! val = 0.1
//! test = 0.1
//! seed = 42
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetCache, LoaderConfig};
use crate::graph::{BondExpansionConfig, DEFAULT_STATE};
use crate::model::types::Element;

/// Errors raised while reading or validating a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read configuration: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Train/validation/test fractions and the shuffle seed used to split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitConfig {
    pub train: f64,
    pub val: f64,
    pub test: f64,
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
            seed: None,
        }
    }
}

impl SplitConfig {
    pub fn fractions(&self) -> [f64; 3] {
        [self.train, self.val, self.test]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Name of the property used as the label.
    pub label_name: String,
    /// One-hot element order. Empty means "every element in the input, by
    /// atomic number".
    pub elements: Vec<Element>,
    /// Neighbor cutoff radius, in Ångströms.
    pub cutoff: f64,
    /// State vector attached to every graph.
    pub state: Vec<f64>,
    pub expansion: BondExpansionConfig,
    pub cache: DatasetCache,
    pub loader: LoaderConfig,
    pub split: SplitConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label_name: "energy".to_string(),
            elements: Vec::new(),
            cutoff: 4.0,
            state: DEFAULT_STATE.to_vec(),
            expansion: BondExpansionConfig::default(),
            cache: DatasetCache::default(),
            loader: LoaderConfig::default(),
            split: SplitConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Checks the settings that would otherwise only fail deep inside a run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.label_name.trim().is_empty() {
            return Err(Error::Invalid("label_name must not be empty".into()));
        }
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(Error::Invalid(format!(
                "cutoff must be positive (got {})",
                self.cutoff
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = self.elements.iter().find(|e| !seen.insert(**e)) {
            return Err(Error::Invalid(format!("element {dup} is listed twice")));
        }
        let total: f64 = self.split.fractions().iter().sum();
        if self
            .split
            .fractions()
            .iter()
            .any(|f| !f.is_finite() || *f < 0.0)
            || (total - 1.0).abs() > 1e-6
        {
            return Err(Error::Invalid(format!(
                "split fractions must be non-negative and sum to 1 (got {:?})",
                self.split.fractions()
            )));
        }
        self.loader
            .validate()
            .map_err(|e| Error::Invalid(e.to_string()))
    }

    /// The configured element list, or every element of `materials` ordered
    /// by atomic number when none is configured.
    pub fn resolve_elements<'a, I>(&self, materials: I) -> Vec<Element>
    where
        I: IntoIterator<Item = &'a crate::model::structure::Material>,
    {
        if !self.elements.is_empty() {
            return self.elements.clone();
        }
        let present: BTreeSet<Element> = materials
            .into_iter()
            .flat_map(|m| m.sites().iter().map(|s| s.element))
            .collect();
        present.into_iter().collect()
    }
}
