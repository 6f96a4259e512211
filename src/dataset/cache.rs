//! On-disk persistence of materialized datasets.
//!
//! A cache is two bincode files: the graph collection (graphs plus a label
//! dictionary keyed by label name) and the stacked state-attribute matrix.
//! Both carry a format version so stale caches fail loudly instead of
//! deserializing into garbage.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::Error;
use crate::model::graph::Graph;

/// Default graph collection file name.
pub const DEFAULT_GRAPH_FILE: &str = "dgl_graph.bin";

/// Default state-attribute file name.
pub const DEFAULT_ATTR_FILE: &str = "graph_attr.pt";

const FORMAT_VERSION: u32 = 1;

/// Reports whether a cache file exists at `path`.
pub fn has_cache(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

/// Locations of the two cache files.
///
/// Relative paths resolve against the current working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetCache {
    pub graph_path: PathBuf,
    pub attr_path: PathBuf,
}

impl Default for DatasetCache {
    fn default() -> Self {
        Self {
            graph_path: PathBuf::from(DEFAULT_GRAPH_FILE),
            attr_path: PathBuf::from(DEFAULT_ATTR_FILE),
        }
    }
}

/// Everything a cache holds, as read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedData {
    pub graphs: Vec<Graph>,
    pub labels: BTreeMap<String, DMatrix<f64>>,
    pub graph_attr: DMatrix<f64>,
}

#[derive(Serialize)]
struct GraphFileRef<'a> {
    version: u32,
    graphs: &'a [Graph],
    labels: BTreeMap<&'a str, &'a DMatrix<f64>>,
}

#[derive(Deserialize)]
struct GraphFile {
    version: u32,
    graphs: Vec<Graph>,
    labels: BTreeMap<String, DMatrix<f64>>,
}

#[derive(Serialize, Deserialize)]
struct AttrFile<M> {
    version: u32,
    graph_attr: M,
}

impl DatasetCache {
    pub fn new(graph_path: impl Into<PathBuf>, attr_path: impl Into<PathBuf>) -> Self {
        Self {
            graph_path: graph_path.into(),
            attr_path: attr_path.into(),
        }
    }

    /// Cache with the default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(dir.join(DEFAULT_GRAPH_FILE), dir.join(DEFAULT_ATTR_FILE))
    }

    /// Whether the graph collection file exists.
    pub fn exists(&self) -> bool {
        has_cache(&self.graph_path)
    }

    /// Writes both files, replacing any previous cache.
    pub fn write(
        &self,
        graphs: &[Graph],
        labels: BTreeMap<&str, &DMatrix<f64>>,
        graph_attr: &DMatrix<f64>,
    ) -> Result<(), Error> {
        let payload = GraphFileRef {
            version: FORMAT_VERSION,
            graphs,
            labels,
        };
        write_bincode(&self.graph_path, &payload)?;
        write_bincode(
            &self.attr_path,
            &AttrFile {
                version: FORMAT_VERSION,
                graph_attr,
            },
        )?;

        debug!(
            graphs = graphs.len(),
            graph_path = %self.graph_path.display(),
            attr_path = %self.attr_path.display(),
            "wrote dataset cache"
        );
        Ok(())
    }

    /// Reads both files back.
    pub fn read(&self) -> Result<CachedData, Error> {
        let graph_file: GraphFile = read_bincode(&self.graph_path)?;
        check_version(graph_file.version)?;
        let attr_file: AttrFile<DMatrix<f64>> = read_bincode(&self.attr_path)?;
        check_version(attr_file.version)?;

        Ok(CachedData {
            graphs: graph_file.graphs,
            labels: graph_file.labels,
            graph_attr: attr_file.graph_attr,
        })
    }
}

fn check_version(found: u32) -> Result<(), Error> {
    if found == FORMAT_VERSION {
        Ok(())
    } else {
        Err(Error::CacheVersion {
            expected: FORMAT_VERSION,
            found,
        })
    }
}

fn write_bincode<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_bincode<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, Error> {
    if !has_cache(path) {
        return Err(Error::CacheNotFound {
            path: path.to_path_buf(),
        });
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}
