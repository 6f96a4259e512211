use std::io::{self, Write};

use anyhow::Error;

use matgraph_forge::{config, dataset, graph, io as xyz, reference};

use crate::util::text::wrap;

#[rustfmt::skip]
pub fn print_error(err: &Error) {
    let mut stderr = io::stderr().lock();

    let _ = writeln!(stderr);
    let _ = writeln!(stderr, "   ╔══════════════════════════════════════════════════════════════╗");
    let _ = writeln!(stderr, "   ║  ✗ Error                                                     ║");
    let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");

    for line in wrap(&err.to_string(), 59) {
        let _ = writeln!(stderr, "   ║  {:<59} ║", line);
    }

    for cause in err.chain().skip(1) {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Caused by:                                                  ║");
        for line in wrap(&cause.to_string(), 57) {
            let _ = writeln!(stderr, "   ║    {:<57} ║", line);
        }
    }

    if let Some(hints) = HintCollector::collect(err) {
        let _ = writeln!(stderr, "   ╟──────────────────────────────────────────────────────────────╢");
        let _ = writeln!(stderr, "   ║  Hints:                                                      ║");
        for hint in hints {
            let wrapped = wrap(&hint, 55);
            if let Some((first, rest)) = wrapped.split_first() {
                let _ = writeln!(stderr, "   ║    • {:<55} ║", first);
                for line in rest {
                    let _ = writeln!(stderr, "   ║      {:<55} ║", line);
                }
            }
        }
    }

    let _ = writeln!(stderr, "   ╚══════════════════════════════════════════════════════════════╝");
    let _ = writeln!(stderr);
}

struct HintCollector {
    hints: Vec<String>,
    has_typed_hints: bool,
}

impl HintCollector {
    fn new() -> Self {
        Self {
            hints: Vec::new(),
            has_typed_hints: false,
        }
    }

    /// Hints for the first library error found along the cause chain.
    fn collect(err: &Error) -> Option<Vec<String>> {
        let mut collector = Self::new();

        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<xyz::Error>() {
                collector.collect_xyz_hints(e);
            } else if let Some(e) = cause.downcast_ref::<config::Error>() {
                collector.collect_config_hints(e);
            } else if let Some(e) = cause.downcast_ref::<dataset::Error>() {
                collector.collect_dataset_hints(e);
            } else if let Some(e) = cause.downcast_ref::<reference::Error>() {
                collector.collect_reference_hints(e);
            } else if let Some(e) = cause.downcast_ref::<graph::Error>() {
                collector.collect_graph_hints(e);
            }
            if collector.has_typed_hints {
                break;
            }
        }

        if !collector.has_typed_hints {
            collector.collect_fallback_hints(err);
        }

        if collector.hints.is_empty() {
            None
        } else {
            Some(collector.hints)
        }
    }

    fn add(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }

    fn mark_typed(&mut self) {
        self.has_typed_hints = true;
    }

    fn collect_xyz_hints(&mut self, err: &xyz::Error) {
        self.mark_typed();

        match err {
            xyz::Error::Io { source } => self.collect_std_io_hints(source),

            xyz::Error::Parse { line, .. } => {
                self.add(format!("The XYZ parser stopped near line {line}"));
                self.add("Each frame is: atom count, comment line, one line per site");
                self.add("Lattice must hold 9 numbers; site lines need a symbol and 3 coordinates");
            }

            xyz::Error::MissingProperty { frame, key } => {
                self.add(format!("Frame {frame} has no '{key}' entry in its comment line"));
                self.add("Choose the label with --label, or add KEY=VALUE to every frame");
            }
        }
    }

    fn collect_config_hints(&mut self, err: &config::Error) {
        self.mark_typed();

        match err {
            config::Error::Io { source } => self.collect_std_io_hints(source),

            config::Error::Parse(_) => {
                self.add("Configuration file has invalid TOML syntax or an unknown key");
                self.add("Valid sections: [expansion], [cache], [loader], [split]");
            }

            config::Error::Invalid(_) => {
                self.add("A configuration value is out of range");
                self.add("Check cutoff, split fractions, batch size, and element list");
            }
        }
    }

    fn collect_dataset_hints(&mut self, err: &dataset::Error) {
        use dataset::Error as E;

        self.mark_typed();

        match err {
            E::Io { source } => self.collect_std_io_hints(source),

            E::CacheNotFound { path } => {
                self.add(format!("No cache at {}", path.display()));
                self.add("Run 'mgforge build' first, or point --cache-dir at an existing cache");
            }

            E::MissingLabel(name) => {
                self.add(format!("The cache holds no label named '{name}'"));
                self.add("Pass the label the cache was built with via --label");
            }

            E::CacheVersion { .. } | E::CorruptCache(_) | E::Serialization(_) => {
                self.add("The cache files are unreadable or from another version");
                self.add("Rebuild with 'mgforge build --force'");
            }

            E::Conversion { position, source } => {
                self.add(format!("Structure {position} could not be turned into a graph"));
                self.collect_graph_hints(source);
            }

            E::Graph(source) => self.collect_graph_hints(source),

            E::StateDimension { position, .. } => {
                self.add(format!("Structure {position} produced a state vector of a different length"));
                self.add("Every graph must carry the same number of state attributes");
            }

            E::LengthMismatch { .. } => {
                self.add("Every structure needs exactly one label row");
            }

            E::InvalidSplit(_) => {
                self.add("Split fractions must be non-negative and sum to 1");
                self.add("Adjust the [split] section of the configuration");
            }

            E::InvalidLoaderConfig(_) => {
                self.add("Check --batch-size and the [loader] section");
            }

            E::EmptyBatch
            | E::LabelArity { .. }
            | E::AttrDimension { .. }
            | E::Batch(_)
            | E::IndexOutOfRange { .. } => {
                self.add("Graphs in the cache do not share one shape");
                self.add("Rebuild the cache with a fixed element list via --elements");
            }
        }
    }

    fn collect_graph_hints(&mut self, err: &graph::Error) {
        use graph::Error as E;

        self.mark_typed();

        match err {
            E::UnknownElement(element) => {
                self.add(format!("Element {element} is missing from the one-hot element list"));
                self.add("Add it to --elements, or omit --elements to infer the list");
            }

            E::EmptyStructure => {
                self.add("A frame has no sites; remove it from the input");
            }

            E::InvalidCutoff(_) => {
                self.add("The cutoff must be a positive distance in Å");
            }

            E::DegenerateLattice { .. } => {
                self.add("A lattice has (near) zero volume");
                self.add("Mark non-periodic frames with pbc=\"F F F\" or drop the Lattice key");
            }

            E::InvalidExpansion(_) => {
                self.add("Check --num-centers, --rbf-width, and the [expansion] section");
            }

            E::EdgeFeatureRows { .. } => {
                self.add("Edge features disagree with the edge count");
                self.add("This indicates a bug; please report it with the input file");
            }
        }
    }

    fn collect_reference_hints(&mut self, err: &reference::Error) {
        use reference::Error as E;

        self.mark_typed();

        match err {
            E::Io { source } => self.collect_std_io_hints(source),

            E::UnknownElement(element) => {
                self.add(format!("Element {element} is not in the element list"));
                self.add("Add it to --elements, or omit --elements to infer the list");
            }

            E::PropertyShape { .. } => {
                self.add("Every frame needs one value per fitted state");
                self.add("Check the keys passed to --states");
            }

            E::EmptyFit => {
                self.add("The input contains no structures to fit");
            }

            E::PseudoInverse(_) => {
                self.add("The least-squares system could not be solved");
                self.add("Check the property values for NaN or infinity");
            }

            E::Table(_) | E::TableParse(_) | E::TableSerialize(_) => {
                self.add("The offset table is malformed");
                self.add("Use either a top-level [offsets] table or [[states]] entries");
            }

            E::ElementIndex { .. }
            | E::OneHotWidth { .. }
            | E::MalformedOneHot { .. }
            | E::MissingStateIndex
            | E::UnexpectedStateIndex
            | E::StateIndexLength { .. }
            | E::StateIndexRange { .. } => {
                self.add("Offsets and graphs disagree on the element encoding");
                self.add("Fit and evaluate with the same element list");
            }
        }
    }

    fn collect_std_io_hints(&mut self, source: &std::io::Error) {
        use std::io::ErrorKind;

        match source.kind() {
            ErrorKind::NotFound => {
                self.add("File or directory not found");
                self.add("Check the path spelling and ensure the file exists");
            }

            ErrorKind::PermissionDenied => {
                self.add("Permission denied accessing the file");
                self.add("Check file permissions with `ls -la`");
            }

            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                self.add("File is truncated or contains invalid data");
                self.add("Verify the file was written completely");
            }

            ErrorKind::WriteZero | ErrorKind::StorageFull => {
                self.add("Failed to write data (disk full?)");
                self.add("Check available disk space");
            }

            ErrorKind::BrokenPipe => {
                self.add("Output consumer terminated early");
                self.add("This may occur when piping to commands like `head`");
            }

            _ => {
                self.add("I/O operation failed");
                self.add("Check file path, permissions, and disk space");
            }
        }
    }

    fn collect_fallback_hints(&mut self, err: &Error) {
        let msg = error_chain_text(err);

        if msg.contains("no such file") || msg.contains("not found") {
            self.add("Check that the file path is correct");
            self.add("Verify the file exists and is readable");
            return;
        }

        if msg.contains("permission denied") {
            self.add("Check file permissions with `ls -la`");
            return;
        }

        if msg.contains("empty") {
            self.add("Input appears to be empty");
            self.add("Verify the input contains at least one frame");
        }
    }
}

fn error_chain_text(err: &Error) -> String {
    err.chain()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn typed_hints_found_through_context() {
        let err = Err::<(), _>(dataset::Error::MissingLabel("gap".into()))
            .context("Failed to load cache")
            .unwrap_err();
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints.iter().any(|h| h.contains("'gap'")));
    }

    #[test]
    fn conversion_errors_explain_the_graph_failure() {
        let err = anyhow::Error::new(dataset::Error::Conversion {
            position: 3,
            source: graph::Error::EmptyStructure,
        });
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints[0].contains("Structure 3"));
        assert!(hints.iter().any(|h| h.contains("no sites")));
    }

    #[test]
    fn untyped_errors_fall_back_to_message_text() {
        let err = anyhow::anyhow!("input file is empty");
        let hints = HintCollector::collect(&err).unwrap();
        assert!(hints.iter().any(|h| h.contains("at least one frame")));
    }
}
