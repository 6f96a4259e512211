use anyhow::{Context, Result};

use matgraph_forge::PipelineConfig;
use matgraph_forge::dataset::DatasetCache;

use crate::cli::{CacheOptions, ExpansionOptions, LoaderOptions, PipelineOptions};

/// Loads the configuration file (or defaults) and layers command-line
/// overrides on top.
pub fn build_pipeline_config(opts: &PipelineOptions) -> Result<PipelineConfig> {
    let mut config = match &opts.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(label) = &opts.label {
        config.label_name = label.clone();
    }
    if !opts.elements.is_empty() {
        config.elements = opts.elements.clone();
    }
    if let Some(cutoff) = opts.cutoff {
        config.cutoff = cutoff;
    }

    Ok(config)
}

pub fn apply_cache_options(config: &mut PipelineConfig, opts: &CacheOptions) {
    if let Some(dir) = &opts.dir {
        config.cache = DatasetCache::in_dir(dir);
    }
    if let Some(path) = &opts.graph_file {
        config.cache.graph_path = path.clone();
    }
    if let Some(path) = &opts.attr_file {
        config.cache.attr_path = path.clone();
    }
}

pub fn apply_expansion_options(config: &mut PipelineConfig, opts: &ExpansionOptions) {
    if let Some(n) = opts.num_centers {
        config.expansion.num_centers = n;
    }
    if let Some(width) = opts.width {
        config.expansion.width = width;
    }
    if let Some(last) = opts.r#final {
        config.expansion.r#final = last;
    }
}

pub fn apply_loader_options(config: &mut PipelineConfig, opts: &LoaderOptions) {
    if let Some(batch_size) = opts.batch_size {
        config.loader.batch_size = batch_size;
    }
    if let Some(workers) = opts.num_workers {
        config.loader.num_workers = workers;
    }
    if let Some(seed) = opts.seed {
        config.loader.seed = Some(seed);
        config.split.seed = Some(seed);
    }
}

/// Re-validates after overrides so bad flags fail before any work starts.
pub fn finalize(config: PipelineConfig) -> Result<PipelineConfig> {
    config.validate().context("Invalid pipeline settings")?;
    Ok(config)
}
