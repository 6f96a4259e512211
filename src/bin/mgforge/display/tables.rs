use std::collections::BTreeMap;
use std::io::{self, Write};

use matgraph_forge::reference::ReferenceTable;
use matgraph_forge::{Element, GraphDataset, Material};

use crate::util::text::{group_digits, truncate};

const INDENT: &str = "      ";

const BOX_INNER_WIDTH: usize = 62;
const SAFE_TABLE_WIDTH: usize = BOX_INNER_WIDTH - INDENT.len();

const MAX_DISTRIBUTION_ROWS: usize = 15;

/// One line of the loader dry-run table.
pub struct LoaderRow {
    pub name: &'static str,
    pub samples: usize,
    pub batches: usize,
    pub shuffled: bool,
}

pub fn print_input_summary(materials: &[Material], label_name: &str) {
    let mut out = io::stderr().lock();

    let crystals = materials.iter().filter(|m| m.is_periodic()).count();
    let sites: usize = materials.iter().map(Material::site_count).sum();

    let rows = vec![
        ("Structures", group_digits(materials.len())),
        ("Crystals", group_digits(crystals)),
        ("Molecules", group_digits(materials.len() - crystals)),
        ("Total Sites", group_digits(sites)),
        ("Label", label_name.to_string()),
    ];

    print_kv_table(&mut out, "Input Summary", &rows);
}

pub fn print_element_distribution(materials: &[Material]) {
    let mut out = io::stderr().lock();

    let mut counts: BTreeMap<Element, usize> = BTreeMap::new();
    for material in materials {
        for (element, n) in material.composition() {
            *counts.entry(element).or_insert(0) += n;
        }
    }

    let total: usize = counts.values().sum();
    let mut sorted: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(e, c)| (e.symbol().to_string(), c))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));

    print_distribution_table(&mut out, "Element Distribution", &sorted, total);
}

pub fn print_dataset_summary(dataset: &GraphDataset) {
    let mut out = io::stderr().lock();

    let nodes: usize = dataset.graphs().iter().map(|g| g.num_nodes()).sum();
    let edges: usize = dataset.graphs().iter().map(|g| g.num_edges()).sum();
    let node_width = dataset.graphs().first().map_or(0, |g| g.node_width());
    let edge_width = dataset
        .graphs()
        .first()
        .and_then(|g| g.edge_feature_width())
        .unwrap_or(0);
    let mean_degree = if nodes == 0 {
        0.0
    } else {
        edges as f64 / nodes as f64
    };

    let rows = vec![
        ("Graphs", group_digits(dataset.len())),
        ("Nodes", group_digits(nodes)),
        ("Edges", group_digits(edges)),
        ("Mean Degree", format!("{mean_degree:.2}")),
        ("One-hot Width", node_width.to_string()),
        ("Edge Features", edge_width.to_string()),
        (
            "Label",
            format!("{} ({})", dataset.label_name(), dataset.label_dim()),
        ),
        ("State Dim", dataset.state_dim().to_string()),
    ];

    print_kv_table(&mut out, "Dataset Summary", &rows);
}

pub fn print_offsets(table: &ReferenceTable) {
    let mut out = io::stderr().lock();

    let (title, rows): (String, Vec<(String, String)>) = match &table.offsets {
        Some(offsets) => (
            "Elemental Offsets".to_string(),
            offsets
                .iter()
                .map(|(e, v)| (e.symbol().to_string(), format!("{v:+.6}")))
                .collect(),
        ),
        None => {
            let mut per_element: BTreeMap<Element, Vec<String>> = BTreeMap::new();
            for state in &table.states {
                for (e, v) in state {
                    per_element.entry(*e).or_default().push(format!("{v:+.4}"));
                }
            }
            (
                format!("Elemental Offsets ({} states)", table.states.len()),
                per_element
                    .into_iter()
                    .map(|(e, vs)| (e.symbol().to_string(), vs.join(" ")))
                    .collect(),
            )
        }
    };

    let rows: Vec<(&str, String)> = rows.iter().map(|(k, v)| (k.as_str(), v.clone())).collect();
    print_kv_table(&mut out, &title, &rows);
}

pub fn print_loader_summary(rows: &[LoaderRow]) {
    let mut out = io::stderr().lock();

    let widths = [8usize, 10, 10, 8];
    let line = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        format!("{INDENT}{left}{}{right}", segments.join(mid))
    };

    let _ = writeln!(out, "{INDENT}┌─ Loader Dry Run ─┐");
    let _ = writeln!(out, "{}", line("┌", "┬", "┐"));
    let _ = writeln!(
        out,
        "{INDENT}│ {:<w0$} │ {:>w1$} │ {:>w2$} │ {:<w3$} │",
        "Split",
        "Samples",
        "Batches",
        "Shuffle",
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3]
    );
    let _ = writeln!(out, "{}", line("├", "┼", "┤"));
    for row in rows {
        let _ = writeln!(
            out,
            "{INDENT}│ {:<w0$} │ {:>w1$} │ {:>w2$} │ {:<w3$} │",
            row.name,
            group_digits(row.samples),
            group_digits(row.batches),
            if row.shuffled { "yes" } else { "no" },
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3]
        );
    }
    let _ = writeln!(out, "{}", line("└", "┴", "┘"));
}

fn print_distribution_table(
    out: &mut impl Write,
    title: &str,
    data: &[(String, usize)],
    total: usize,
) {
    let name_w = 10usize;
    let count_w = 8usize;
    let sep_overhead = 6;
    let dist_w = SAFE_TABLE_WIDTH.saturating_sub(name_w + count_w + sep_overhead);
    let max_bar_width = dist_w.saturating_sub(8).min(20);

    let rule = |left: &str, mid: &str, right: &str| {
        format!(
            "{INDENT}{left}{}{mid}{}{mid}{}{right}",
            "─".repeat(name_w + 2),
            "─".repeat(count_w + 2),
            "─".repeat(dist_w + 2)
        )
    };

    let _ = writeln!(
        out,
        "{INDENT}┌─ {} ─┐",
        truncate(title, SAFE_TABLE_WIDTH - 6)
    );
    let _ = writeln!(out, "{}", rule("┌", "┬", "┐"));
    let _ = writeln!(
        out,
        "{INDENT}│ {:<name_w$} │ {:>count_w$} │ {:<dist_w$} │",
        "Element", "Sites", "Distribution"
    );
    let _ = writeln!(out, "{}", rule("├", "┼", "┤"));

    for (name, count) in data.iter().take(MAX_DISTRIBUTION_ROWS) {
        let pct = if total == 0 {
            0.0
        } else {
            (*count as f64 / total as f64) * 100.0
        };
        let dist_cell = format!("{}  {:>5.1}%", make_bar(pct, max_bar_width), pct);
        let _ = writeln!(
            out,
            "{INDENT}│ {:<name_w$} │ {:>count_w$} │ {:<dist_w$} │",
            truncate(name, name_w),
            group_digits(*count),
            dist_cell
        );
    }

    if data.len() > MAX_DISTRIBUTION_ROWS {
        let _ = writeln!(
            out,
            "{INDENT}│ {:<name_w$} │ {:>count_w$} │ {:<dist_w$} │",
            "...",
            "...",
            format!("({} more elements)", data.len() - MAX_DISTRIBUTION_ROWS)
        );
    }

    let _ = writeln!(out, "{}", rule("└", "┴", "┘"));
}

fn print_kv_table(out: &mut impl Write, title: &str, rows: &[(&str, String)]) {
    let key_w = 16usize;
    let sep_overhead = 6;
    let val_w = SAFE_TABLE_WIDTH.saturating_sub(key_w + sep_overhead);

    let rule = |left: &str, mid: &str, right: &str| {
        format!(
            "{INDENT}{left}{}{mid}{}{right}",
            "─".repeat(key_w + 2),
            "─".repeat(val_w + 2)
        )
    };

    let _ = writeln!(
        out,
        "{INDENT}┌─ {} ─┐",
        truncate(title, SAFE_TABLE_WIDTH - 6)
    );
    let _ = writeln!(out, "{}", rule("┌", "┬", "┐"));
    for (key, val) in rows {
        let _ = writeln!(
            out,
            "{INDENT}│ {:<key_w$} │ {:>val_w$} │",
            truncate(key, key_w),
            truncate(val, val_w)
        );
    }
    let _ = writeln!(out, "{}", rule("└", "┴", "┘"));
}

fn make_bar(pct: f64, max_width: usize) -> String {
    let filled = (((pct / 100.0) * max_width as f64).round() as usize).min(max_width);
    format!("{}{}", "█".repeat(filled), "░".repeat(max_width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_is_clamped_to_width() {
        assert_eq!(make_bar(50.0, 4), "██░░");
        assert_eq!(make_bar(150.0, 4), "████");
        assert_eq!(make_bar(0.0, 3), "░░░");
    }

    #[test]
    fn kv_table_rows_have_equal_width() {
        let mut buf = Vec::new();
        print_kv_table(
            &mut buf,
            "Summary",
            &[("Graphs", "12".to_string()), ("Label", "energy (1)".to_string())],
        );
        let text = String::from_utf8(buf).unwrap();
        let widths: Vec<usize> = text
            .lines()
            .skip(1)
            .map(|l| l.chars().count())
            .collect();
        assert_eq!(widths.len(), 4);
        assert!(widths.windows(2).all(|w| w[0] == w[1]));
    }
}
