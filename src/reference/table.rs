//! Human-readable TOML form of a fitted reference.
//!
//! Offsets are keyed by element symbol, so a table stays meaningful when the
//! element list of a later run is ordered differently:
//!
//! ```toml
//! [offsets]
//! H = -3.39
//! O = -7.20
//! ```
//!
//! State-indexed references use one `[[states]]` table per state instead.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::{ElementalReference, PropertyOffset};
use crate::model::types::Element;

type OffsetRow = BTreeMap<Element, f64>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offsets: Option<OffsetRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<OffsetRow>,
}

impl ReferenceTable {
    /// Names the columns of `reference` with `element_list`, which must have
    /// exactly `max_z` entries.
    pub fn from_reference(
        reference: &ElementalReference,
        element_list: &[Element],
    ) -> Result<Self, Error> {
        if element_list.len() != reference.max_z() {
            return Err(Error::Table(format!(
                "{} element names for {} offset columns",
                element_list.len(),
                reference.max_z()
            )));
        }
        let name_row = |values: &[f64]| -> OffsetRow {
            element_list.iter().copied().zip(values.iter().copied()).collect()
        };

        Ok(match reference.offset() {
            PropertyOffset::Scalar(v) => Self {
                offsets: Some(name_row(v.as_slice())),
                states: Vec::new(),
            },
            PropertyOffset::StateIndexed(m) => Self {
                offsets: None,
                states: m
                    .row_iter()
                    .map(|row| name_row(row.transpose().as_slice()))
                    .collect(),
            },
        })
    }

    /// Lays the named offsets out along `element_list`.
    ///
    /// Elements of the list that the table does not mention get a zero offset.
    pub fn to_reference(&self, element_list: &[Element]) -> Result<ElementalReference, Error> {
        let max_z = element_list.len();
        let column = |element: Element| {
            element_list
                .iter()
                .position(|&e| e == element)
                .ok_or(Error::UnknownElement(element))
        };

        match (&self.offsets, self.states.is_empty()) {
            (Some(row), true) => {
                let mut offset = DVector::zeros(max_z);
                for (&element, &value) in row {
                    offset[column(element)?] = value;
                }
                Ok(ElementalReference::new(PropertyOffset::Scalar(offset)))
            }
            (None, false) => {
                let mut offset = DMatrix::zeros(self.states.len(), max_z);
                for (state, row) in self.states.iter().enumerate() {
                    for (&element, &value) in row {
                        offset[(state, column(element)?)] = value;
                    }
                }
                Ok(ElementalReference::new(PropertyOffset::StateIndexed(offset)))
            }
            (Some(_), false) => Err(Error::Table(
                "table has both [offsets] and [[states]]".into(),
            )),
            (None, true) => Err(Error::Table(
                "table has neither [offsets] nor [[states]]".into(),
            )),
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn write_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}
