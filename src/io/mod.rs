//! Reading and writing structure files.
//!
//! Structures arrive as multi-frame extended XYZ: each frame is one
//! [`Material`] plus the numeric `key=value` properties of its comment line,
//! which serve as labels.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::model::structure::Material;

pub mod error;
pub mod xyz;

pub use error::Error;

/// One structure with its per-frame properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub material: Material,
    pub properties: BTreeMap<String, f64>,
}

impl Frame {
    pub fn new(material: impl Into<Material>) -> Self {
        Self {
            material: material.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: f64) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Collects property `key` from every frame, in order.
pub fn property_column(frames: &[Frame], key: &str) -> Result<Vec<f64>, Error> {
    frames
        .iter()
        .enumerate()
        .map(|(frame, f)| {
            f.properties
                .get(key)
                .copied()
                .ok_or_else(|| Error::MissingProperty {
                    frame,
                    key: key.to_string(),
                })
        })
        .collect()
}

pub fn read_xyz_file(path: impl AsRef<Path>) -> Result<Vec<Frame>, Error> {
    let file = File::open(path)?;
    xyz::reader::read(BufReader::new(file))
}

pub fn write_xyz_file(path: impl AsRef<Path>, frames: &[Frame]) -> Result<(), Error> {
    let file = File::create(path)?;
    xyz::writer::write(BufWriter::new(file), frames)
}
