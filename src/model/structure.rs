use std::collections::BTreeMap;

use super::site::Site;
use super::types::Element;
use super::vec3::{self, Vec3};

/// Three lattice vectors as rows, in Ångströms.
pub type Lattice = [Vec3; 3];

/// A periodic crystal: a unit cell and the sites it contains.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    pub lattice: Lattice,
    pub sites: Vec<Site>,
}

impl Structure {
    pub fn new(lattice: Lattice) -> Self {
        Self {
            lattice,
            sites: Vec::new(),
        }
    }

    pub fn with_sites(lattice: Lattice, sites: Vec<Site>) -> Self {
        Self { lattice, sites }
    }

    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    /// Signed cell volume `a · (b × c)`.
    pub fn volume(&self) -> f64 {
        let [a, b, c] = self.lattice;
        vec3::dot(a, vec3::cross(b, c))
    }

    /// Distances between opposite cell faces, one per lattice vector.
    ///
    /// Used to decide how many periodic images a cutoff sphere can reach.
    pub fn face_spacings(&self) -> [f64; 3] {
        let [a, b, c] = self.lattice;
        let volume = self.volume().abs();
        [
            volume / vec3::norm(vec3::cross(b, c)),
            volume / vec3::norm(vec3::cross(c, a)),
            volume / vec3::norm(vec3::cross(a, b)),
        ]
    }

    /// Cartesian translation for the integer image `(i, j, k)`.
    pub fn image_shift(&self, image: [i32; 3]) -> Vec3 {
        let [a, b, c] = self.lattice;
        vec3::add(
            vec3::add(vec3::scale(a, image[0] as f64), vec3::scale(b, image[1] as f64)),
            vec3::scale(c, image[2] as f64),
        )
    }

    /// Fractional coordinates of a Cartesian point in this cell.
    pub fn fractional(&self, position: Vec3) -> Vec3 {
        let [a, b, c] = self.lattice;
        let volume = self.volume();
        [
            vec3::dot(position, vec3::cross(b, c)) / volume,
            vec3::dot(position, vec3::cross(c, a)) / volume,
            vec3::dot(position, vec3::cross(a, b)) / volume,
        ]
    }

    /// Sites translated into the cell, fractional coordinates in `[0, 1)`.
    ///
    /// Element order and identity are preserved; only positions change.
    pub fn wrapped_sites(&self) -> Vec<Site> {
        let [a, b, c] = self.lattice;
        self.sites
            .iter()
            .map(|site| {
                let f = self.fractional(site.position).map(|x| {
                    let w = x - x.floor();
                    if w >= 1.0 { 0.0 } else { w }
                });
                let position = vec3::add(
                    vec3::add(vec3::scale(a, f[0]), vec3::scale(b, f[1])),
                    vec3::scale(c, f[2]),
                );
                Site::new(site.element, position)
            })
            .collect()
    }
}

/// A finite (non-periodic) molecule.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Molecule {
    pub sites: Vec<Site>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sites(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }
}

/// Raw chemical input to the graph pipeline.
///
/// The variant is the only thing the builder branches on: crystals go through
/// the periodic converter path, molecules through the finite one.
#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Crystal(Structure),
    Molecule(Molecule),
}

impl Material {
    pub fn sites(&self) -> &[Site] {
        match self {
            Material::Crystal(s) => &s.sites,
            Material::Molecule(m) => &m.sites,
        }
    }

    #[inline]
    pub fn site_count(&self) -> usize {
        self.sites().len()
    }

    #[inline]
    pub fn is_periodic(&self) -> bool {
        matches!(self, Material::Crystal(_))
    }

    pub fn lattice(&self) -> Option<&Lattice> {
        match self {
            Material::Crystal(s) => Some(&s.lattice),
            Material::Molecule(_) => None,
        }
    }

    /// Number of sites per element, ordered by atomic number.
    pub fn composition(&self) -> BTreeMap<Element, usize> {
        let mut counts = BTreeMap::new();
        for site in self.sites() {
            *counts.entry(site.element).or_insert(0) += 1;
        }
        counts
    }

    /// Unreduced formula such as `H2O`, elements in atomic-number order.
    pub fn formula(&self) -> String {
        self.composition()
            .into_iter()
            .map(|(element, count)| {
                if count == 1 {
                    element.symbol().to_string()
                } else {
                    format!("{}{}", element.symbol(), count)
                }
            })
            .collect()
    }
}

impl From<Structure> for Material {
    fn from(s: Structure) -> Self {
        Material::Crystal(s)
    }
}

impl From<Molecule> for Material {
    fn from(m: Molecule) -> Self {
        Material::Molecule(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cubic(a: f64) -> Lattice {
        [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]]
    }

    #[test]
    fn cubic_cell_volume_and_spacings() {
        let s = Structure::new(cubic(3.0));
        assert!((s.volume() - 27.0).abs() < 1e-12);
        for h in s.face_spacings() {
            assert!((h - 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn image_shift_combines_lattice_vectors() {
        let s = Structure::new([[2.0, 0.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 4.0]]);
        assert_eq!(s.image_shift([1, -1, 2]), [1.0, -2.0, 8.0]);
        assert_eq!(s.image_shift([0, 0, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn wrapped_sites_fall_inside_the_cell() {
        let s = Structure::with_sites(
            [[2.0, 0.0, 0.0], [1.0, 2.0, 0.0], [0.0, 0.0, 4.0]],
            vec![
                Site::new(Element::H, [0.5, 0.5, 0.5]),
                Site::new(Element::O, [-0.5, 4.5, 9.0]),
            ],
        );
        let wrapped = s.wrapped_sites();
        assert_eq!(wrapped[0], s.sites[0]);
        assert_eq!(wrapped[1].element, Element::O);
        for site in &wrapped {
            for f in s.fractional(site.position) {
                assert!((-1e-12..1.0).contains(&f), "fractional {f} outside cell");
            }
        }
        // The wrapped site differs from the original by a lattice translation.
        let delta = s.fractional(vec3::sub(s.sites[1].position, wrapped[1].position));
        for f in delta {
            assert!((f - f.round()).abs() < 1e-12);
        }
    }

    #[test]
    fn material_dispatch_and_composition() {
        let water = Material::from(Molecule::with_sites(vec![
            Site::new(Element::O, [0.0, 0.0, 0.0]),
            Site::new(Element::H, [0.96, 0.0, 0.0]),
            Site::new(Element::H, [-0.24, 0.93, 0.0]),
        ]));
        assert!(!water.is_periodic());
        assert!(water.lattice().is_none());
        assert_eq!(water.site_count(), 3);
        assert_eq!(water.composition().get(&Element::H), Some(&2));
        assert_eq!(water.formula(), "H2O");

        let nacl = Material::from(Structure::with_sites(
            cubic(5.64),
            vec![
                Site::new(Element::Na, [0.0, 0.0, 0.0]),
                Site::new(Element::Cl, [2.82, 2.82, 2.82]),
            ],
        ));
        assert!(nacl.is_periodic());
        assert_eq!(nacl.formula(), "NaCl");
    }
}
