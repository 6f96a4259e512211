use std::io::Write;

use anyhow::{Context, Result};
use nalgebra::DMatrix;

use matgraph_forge::io::property_column;
use matgraph_forge::reference::ReferenceTable;
use matgraph_forge::{Element, ElementalReference, ReferenceItem};

use super::{as_strs, element_list_text, read_frames, split_frames};
use crate::cli::FitArgs;
use crate::config::{build_pipeline_config, finalize};
use crate::display::{Context as DisplayContext, Progress, print_input_summary, print_offsets};
use crate::io::create_output;

const TOTAL_STEPS: u8 = 3;

pub fn run_fit(args: FitArgs, ctx: DisplayContext) -> Result<()> {
    let config = finalize(build_pipeline_config(&args.pipeline)?)?;
    let state_indexed = !args.states.is_empty();
    let keys = if state_indexed {
        args.states.clone()
    } else {
        vec![config.label_name.clone()]
    };

    let mut progress = Progress::new(ctx.interactive, TOTAL_STEPS);

    progress.step("Reading structures");
    let frames = read_frames(&args.input)?;
    let columns = keys
        .iter()
        .map(|key| {
            property_column(&frames, key)
                .with_context(|| format!("Failed to collect property '{key}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    let properties = DMatrix::from_fn(frames.len(), keys.len(), |row, col| columns[col][row]);
    let materials = split_frames(frames);
    let elements = config.resolve_elements(&materials);

    let read_substeps = [
        format!("{} frames from {}", materials.len(), args.input.display()),
        format!("Properties: {}", keys.join(", ")),
        format!("Elements: {}", element_list_text(&elements)),
    ];
    progress.complete_step("Reading structures", &as_strs(&read_substeps));

    if ctx.interactive {
        print_input_summary(&materials, &keys.join(", "));
    }

    progress.step("Fitting elemental offsets");
    let mut reference = if state_indexed {
        ElementalReference::state_indexed(keys.len(), elements.len())
    } else {
        ElementalReference::scalar(elements.len())
    };
    let items: Vec<ReferenceItem<'_>> = materials.iter().map(ReferenceItem::from).collect();
    reference
        .fit(&items, &elements, &properties)
        .context("Elemental reference fit failed")?;
    let rmse = residual_rmse(&reference, &items, &elements, &properties)?;

    let fit_substeps = [
        format!(
            "{} offsets × {} state(s)",
            reference.max_z(),
            reference.num_states()
        ),
        format!("Residual RMSE {rmse:.6}"),
    ];
    progress.complete_step("Fitting elemental offsets", &as_strs(&fit_substeps));

    let table = ReferenceTable::from_reference(&reference, &elements)?;
    if ctx.interactive {
        print_offsets(&table);
    }

    progress.step("Writing offset table");
    let text = table
        .to_toml_string()
        .context("Failed to serialize the offset table")?;
    let mut out = create_output(args.output.as_deref())?;
    out.write_all(text.as_bytes())
        .and_then(|()| out.flush())
        .context("Failed to write the offset table")?;

    let target = match &args.output {
        Some(path) => path.display().to_string(),
        None => "stdout".to_string(),
    };
    progress.complete_step("Writing offset table", &[target.as_str()]);

    progress.finish("Offsets fitted");

    Ok(())
}

/// Root-mean-square residual of the fitted per-structure totals.
fn residual_rmse(
    reference: &ElementalReference,
    items: &[ReferenceItem<'_>],
    elements: &[Element],
    properties: &DMatrix<f64>,
) -> Result<f64> {
    let features = reference.get_feature_matrix(items, elements)?.map(f64::from);
    let predicted = features * reference.offset().as_matrix().transpose();
    let residual = properties - predicted;
    Ok((residual.norm_squared() / residual.len().max(1) as f64).sqrt())
}
