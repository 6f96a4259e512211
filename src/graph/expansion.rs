//! Radial basis expansion of bond lengths into edge features.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::error::Error;

/// Radial basis family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbfType {
    #[default]
    Gaussian,
}

/// Parameters of a [`BondExpansion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BondExpansionConfig {
    pub rbf_type: RbfType,
    /// First center, in Ångströms.
    pub initial: f64,
    /// Last center, in Ångströms.
    #[serde(rename = "final")]
    pub r#final: f64,
    pub num_centers: usize,
    /// Gaussian width σ, in Ångströms.
    pub width: f64,
}

impl Default for BondExpansionConfig {
    fn default() -> Self {
        Self {
            rbf_type: RbfType::Gaussian,
            initial: 0.0,
            r#final: 5.0,
            num_centers: 100,
            width: 0.5,
        }
    }
}

/// Expands each distance `d` into `exp(-(d - c_k)² / (2σ²))` over evenly
/// spaced centers `c_k` from `initial` to `final` inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct BondExpansion {
    rbf_type: RbfType,
    centers: Vec<f64>,
    width: f64,
}

impl BondExpansion {
    pub fn new(config: &BondExpansionConfig) -> Result<Self, Error> {
        if config.num_centers == 0 {
            return Err(Error::InvalidExpansion(
                "num_centers must be at least 1".into(),
            ));
        }
        if !(config.width.is_finite() && config.width > 0.0) {
            return Err(Error::InvalidExpansion(format!(
                "width must be positive (got {})",
                config.width
            )));
        }
        if !(config.initial.is_finite() && config.r#final.is_finite())
            || config.r#final < config.initial
        {
            return Err(Error::InvalidExpansion(format!(
                "center range [{}, {}] is not a finite, ordered interval",
                config.initial, config.r#final
            )));
        }

        let n = config.num_centers;
        let centers = if n == 1 {
            vec![config.initial]
        } else {
            let step = (config.r#final - config.initial) / (n - 1) as f64;
            (0..n).map(|k| config.initial + step * k as f64).collect()
        };

        Ok(Self {
            rbf_type: config.rbf_type,
            centers,
            width: config.width,
        })
    }

    pub fn rbf_type(&self) -> RbfType {
        self.rbf_type
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    #[inline]
    pub fn num_centers(&self) -> usize {
        self.centers.len()
    }

    /// One feature row per distance.
    pub fn expand(&self, distances: &[f64]) -> DMatrix<f64> {
        match self.rbf_type {
            RbfType::Gaussian => {
                let coeff = -0.5 / (self.width * self.width);
                DMatrix::from_fn(distances.len(), self.centers.len(), |e, k| {
                    let diff = distances[e] - self.centers[k];
                    (coeff * diff * diff).exp()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial: f64, fin: f64, num_centers: usize, width: f64) -> BondExpansionConfig {
        BondExpansionConfig {
            rbf_type: RbfType::Gaussian,
            initial,
            r#final: fin,
            num_centers,
            width,
        }
    }

    #[test]
    fn centers_span_inclusive_range() {
        let exp = BondExpansion::new(&config(0.0, 4.0, 5, 0.5)).unwrap();
        assert_eq!(exp.centers(), &[0.0, 1.0, 2.0, 3.0, 4.0]);

        let single = BondExpansion::new(&config(1.5, 4.0, 1, 0.5)).unwrap();
        assert_eq!(single.centers(), &[1.5]);
    }

    #[test]
    fn gaussian_peaks_at_matching_center() {
        let exp = BondExpansion::new(&config(0.0, 4.0, 5, 1.0)).unwrap();
        let m = exp.expand(&[2.0, 0.0]);
        assert_eq!(m.shape(), (2, 5));
        assert!((m[(0, 2)] - 1.0).abs() < 1e-12);
        assert!((m[(0, 3)] - (-0.5f64).exp()).abs() < 1e-12);
        assert!((m[(0, 1)] - m[(0, 3)]).abs() < 1e-12);
        assert!((m[(1, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_distances_give_empty_rows() {
        let exp = BondExpansion::new(&BondExpansionConfig::default()).unwrap();
        assert_eq!(exp.expand(&[]).shape(), (0, 100));
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(BondExpansion::new(&config(0.0, 4.0, 0, 0.5)).is_err());
        assert!(BondExpansion::new(&config(0.0, 4.0, 10, 0.0)).is_err());
        assert!(BondExpansion::new(&config(5.0, 4.0, 10, 0.5)).is_err());
    }

    #[test]
    fn config_reads_final_key_from_toml() {
        let cfg: BondExpansionConfig =
            toml::from_str("initial = 0.5\nfinal = 6.0\nnum_centers = 20\nwidth = 0.3").unwrap();
        assert_eq!(cfg.r#final, 6.0);
        assert_eq!(cfg.num_centers, 20);
        assert_eq!(cfg.rbf_type, RbfType::Gaussian);
    }
}
