use std::sync::Arc;

use anyhow::{Context, Result};

use matgraph_forge::GraphDataset;
use matgraph_forge::dataset::{Collate, GraphLoader, collate, create_loaders, random_split};

use super::as_strs;
use crate::cli::InfoArgs;
use crate::config::{apply_cache_options, apply_loader_options, build_pipeline_config, finalize};
use crate::display::{
    Context as DisplayContext, LoaderRow, Progress, print_dataset_summary, print_loader_summary,
};

pub fn run_info(args: InfoArgs, ctx: DisplayContext) -> Result<()> {
    let mut config = build_pipeline_config(&args.pipeline)?;
    apply_cache_options(&mut config, &args.cache);
    apply_loader_options(&mut config, &args.loader);
    let config = finalize(config)?;

    let mut progress = Progress::new(ctx.interactive, if args.no_loaders { 1 } else { 2 });

    progress.step("Loading dataset cache");
    let dataset = GraphDataset::from_cache(&config.label_name, &config.cache)
        .context("Failed to load the dataset cache")?;
    let load_substeps = [
        format!("Graphs ← {}", config.cache.graph_path.display()),
        format!("State  ← {}", config.cache.attr_path.display()),
    ];
    progress.complete_step("Loading dataset cache", &as_strs(&load_substeps));

    print_dataset_summary(&dataset);

    if !args.no_loaders {
        let dataset = Arc::new(dataset);
        let [train, val, test] =
            random_split(dataset, config.split.fractions(), config.split.seed)
                .context("Failed to split the dataset")?;
        let mut loaders = create_loaders(train, val, test, collate, &config.loader)
            .context("Failed to create data loaders")?;

        let total_batches = loaders.train.len() + loaders.val.len() + loaders.test.len();
        let bar = progress.counted_step("Collating one epoch", total_batches);
        let rows = [
            dry_run("train", &mut loaders.train, || bar.inc(1))?,
            dry_run("val", &mut loaders.val, || bar.inc(1))?,
            dry_run("test", &mut loaders.test, || bar.inc(1))?,
        ];
        let substeps = [format!(
            "Batch size {}, {} worker(s)",
            config.loader.batch_size, config.loader.num_workers
        )];
        progress.complete_step("Collating one epoch", &as_strs(&substeps));

        print_loader_summary(&rows);
    }

    progress.finish("Dataset inspected");

    Ok(())
}

/// Drains one epoch, failing on the first batch that does not collate.
fn dry_run<C: Collate>(
    name: &'static str,
    loader: &mut GraphLoader<C>,
    mut on_batch: impl FnMut(),
) -> Result<LoaderRow> {
    let shuffled = loader.is_shuffled();
    let samples = loader.num_samples();

    let mut batches = 0;
    for batch in loader.iter() {
        batch.with_context(|| format!("Batch {batches} of the {name} loader failed"))?;
        batches += 1;
        on_batch();
    }

    Ok(LoaderRow {
        name,
        samples,
        batches,
        shuffled,
    })
}
