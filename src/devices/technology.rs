//! Storage technology tags.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of storage technologies a microgrid carries.
///
/// Serialized in kebab-case (`li-ion`, `flow`, `flywheel`), matching the
/// `type` column of the device-behaviour table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Technology {
    /// Fast lithium-ion battery.
    LiIon,
    /// Vanadium flow battery.
    Flow,
    /// Flywheel.
    Flywheel,
}

impl Technology {
    /// Every technology, in the fixed order used by state vectors and exports.
    pub const ALL: [Self; 3] = [Self::LiIon, Self::Flow, Self::Flywheel];

    /// Table / config tag for this technology.
    pub fn tag(self) -> &'static str {
        match self {
            Self::LiIon => "li-ion",
            Self::Flow => "flow",
            Self::Flywheel => "flywheel",
        }
    }

    /// Column prefix used in ledgers and CSV exports.
    pub fn column_prefix(self) -> &'static str {
        match self {
            Self::LiIon => "li_ion",
            Self::Flow => "flow",
            Self::Flywheel => "flywheel",
        }
    }

    /// Position of this technology in [`Technology::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Fixed-size map holding one value per [`Technology`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerTechnology<T>(pub [T; 3]);

impl<T> PerTechnology<T> {
    /// Builds a map by calling `f` once per technology.
    pub fn from_fn(mut f: impl FnMut(Technology) -> T) -> Self {
        Self(Technology::ALL.map(&mut f))
    }

    /// Iterates `(technology, value)` pairs in [`Technology::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Technology, &T)> {
        Technology::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T> std::ops::Index<Technology> for PerTechnology<T> {
    type Output = T;

    fn index(&self, tech: Technology) -> &T {
        &self.0[tech.index()]
    }
}

impl<T> std::ops::IndexMut<Technology> for PerTechnology<T> {
    fn index_mut(&mut self, tech: Technology) -> &mut T {
        &mut self.0[tech.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_serde() {
        #[derive(Deserialize)]
        struct Row {
            kind: Technology,
        }
        for tech in Technology::ALL {
            let toml_src = format!("kind = \"{}\"", tech.tag());
            let row: Row = toml::from_str(&toml_src).expect("tag should deserialize");
            assert_eq!(row.kind, tech);
        }
    }

    #[test]
    fn index_matches_all_order() {
        for (i, tech) in Technology::ALL.into_iter().enumerate() {
            assert_eq!(tech.index(), i);
        }
    }

    #[test]
    fn per_technology_indexing() {
        let mut map = PerTechnology::from_fn(|t| t.index() * 10);
        map[Technology::Flow] += 1;
        assert_eq!(map[Technology::LiIon], 0);
        assert_eq!(map[Technology::Flow], 11);
        assert_eq!(map[Technology::Flywheel], 20);
        assert_eq!(map.iter().count(), 3);
    }
}
