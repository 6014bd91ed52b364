//! Curvature model selection.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The hyperbolic model an embedding lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ManifoldKind {
    /// Poincaré disk of dimension `dim`.
    #[default]
    Poincare,
    /// Cartesian stack of `dim` two-dimensional Poincaré disks.
    PoincareStack,
    /// Lorentz hyperboloid with `dim` spatial coordinates and one time coordinate.
    Lorentz,
}

impl ManifoldKind {
    /// Canonical name, as written in embedding file headers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Poincare => "Poincare",
            Self::PoincareStack => "PoincareStack",
            Self::Lorentz => "Lorentz",
        }
    }
}

impl fmt::Display for ManifoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ManifoldKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "poincare" | "disk" => Ok(Self::Poincare),
            "poincarestack" | "poincare_stack" | "stack" => Ok(Self::PoincareStack),
            "lorentz" | "hyperboloid" => Ok(Self::Lorentz),
            _ => Err(ConfigError::UnknownManifold {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_names() {
        for kind in [
            ManifoldKind::Poincare,
            ManifoldKind::PoincareStack,
            ManifoldKind::Lorentz,
        ] {
            assert_eq!(kind.name().parse::<ManifoldKind>(), Ok(kind));
        }
        assert_eq!("HYPERBOLOID".parse::<ManifoldKind>(), Ok(ManifoldKind::Lorentz));
    }

    #[test]
    fn test_unknown_variant_is_an_error() {
        let err = "Klein".parse::<ManifoldKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownManifold { .. }));
    }
}
