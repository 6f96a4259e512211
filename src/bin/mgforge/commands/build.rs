use anyhow::{Context, Result};
use tracing::warn;

use matgraph_forge::GraphDataset;
use matgraph_forge::graph::CutoffConverter;
use matgraph_forge::io::property_column;

use super::{as_strs, element_list_text, read_frames, split_frames};
use crate::cli::BuildArgs;
use crate::config::{
    apply_cache_options, apply_expansion_options, build_pipeline_config, finalize,
};
use crate::display::{
    Context as DisplayContext, Progress, print_dataset_summary, print_element_distribution,
    print_input_summary,
};

pub fn run_build(args: BuildArgs, ctx: DisplayContext) -> Result<()> {
    let mut config = build_pipeline_config(&args.pipeline)?;
    apply_expansion_options(&mut config, &args.expansion);
    apply_cache_options(&mut config, &args.cache);
    let config = finalize(config)?;

    let reuse_cache = config.cache.exists() && !args.force;
    let mut progress = Progress::new(ctx.interactive, if reuse_cache { 2 } else { 3 });

    progress.step("Reading structures");
    let frames = read_frames(&args.input)?;
    let labels = property_column(&frames, &config.label_name)
        .with_context(|| format!("Failed to collect label '{}'", config.label_name))?;
    let materials = split_frames(frames);
    let elements = config.resolve_elements(&materials);

    let read_substeps = [
        format!("{} frames from {}", materials.len(), args.input.display()),
        format!("Label '{}'", config.label_name),
        format!("Elements: {}", element_list_text(&elements)),
    ];
    progress.complete_step("Reading structures", &as_strs(&read_substeps));

    if ctx.interactive {
        print_input_summary(&materials, &config.label_name);
        print_element_distribution(&materials);
    }

    let n_materials = materials.len();
    let mut dataset = GraphDataset::with_scalar_labels(materials, &labels, &config.label_name)?;

    if reuse_cache {
        progress.step("Loading cached graphs");
        dataset
            .load(&config.cache)
            .context("Failed to load the existing dataset cache")?;
        if dataset.len() != n_materials {
            warn!(
                cached = dataset.len(),
                input = n_materials,
                "cache was built from a different input; pass --force to rebuild"
            );
        }
        let substeps = [
            format!("Cache {}", config.cache.graph_path.display()),
            "Pass --force to rebuild".to_string(),
        ];
        progress.complete_step("Loading cached graphs", &as_strs(&substeps));
    } else {
        let converter = CutoffConverter::new(elements, config.cutoff)
            .context("Invalid converter settings")?
            .with_state(config.state.clone());

        let bar = progress.counted_step("Building graphs", n_materials);
        dataset
            .process_with(&converter, &config.expansion, |done, _| {
                bar.set_position(done as u64)
            })
            .context("Graph construction failed")?;
        let build_substeps = [
            format!("Radius cutoff {:.2} Å", config.cutoff),
            format!(
                "Gaussian expansion, {} centers",
                config.expansion.num_centers
            ),
        ];
        progress.complete_step("Building graphs", &as_strs(&build_substeps));

        progress.step("Writing cache");
        dataset
            .save(&config.cache)
            .context("Failed to write the dataset cache")?;
        let write_substeps = [
            format!("Graphs → {}", config.cache.graph_path.display()),
            format!("State  → {}", config.cache.attr_path.display()),
        ];
        progress.complete_step("Writing cache", &as_strs(&write_substeps));
    }

    if ctx.interactive {
        print_dataset_summary(&dataset);
    }

    progress.finish("Dataset ready");

    Ok(())
}
