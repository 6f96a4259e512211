mod build;
mod fit;
mod info;

use build::run_build;
use fit::run_fit;
use info::run_info;

use anyhow::{Context, Result, bail};

use matgraph_forge::io::{Frame, read_xyz_file};
use matgraph_forge::{Element, Material};

use crate::cli::Command;
use crate::display::Context as DisplayContext;

pub fn dispatch(command: Command, ctx: DisplayContext) -> Result<()> {
    match command {
        Command::Build(args) => run_build(args, ctx),
        Command::Fit(args) => run_fit(args, ctx),
        Command::Info(args) => run_info(args, ctx),
    }
}

/// Reads every frame of `path`, refusing an input without any.
fn read_frames(path: &std::path::Path) -> Result<Vec<Frame>> {
    let frames = read_xyz_file(path)
        .with_context(|| format!("Failed to read structures from {}", path.display()))?;
    if frames.is_empty() {
        bail!("Input file {} is empty: no frames found", path.display());
    }
    Ok(frames)
}

fn split_frames(frames: Vec<Frame>) -> Vec<Material> {
    frames.into_iter().map(|f| f.material).collect()
}

fn element_list_text(elements: &[Element]) -> String {
    elements
        .iter()
        .map(|e| e.symbol())
        .collect::<Vec<_>>()
        .join(" ")
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}
