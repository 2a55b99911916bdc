//! Engineering unit system
//!
//! The session asks a [`UnitSystem`] to canonicalise legacy unit spellings,
//! parse unit strings and build a linear converter between two parsed units.
//! [`LinearUnitSystem`] is a table-driven implementation covering the units
//! a simulation typically publishes.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::fmt;

/// Physical dimension of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Dimensionless,
    Length,
    Time,
    Mass,
    Angle,
    Temperature,
    Velocity,
    AngularVelocity,
    Force,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Dimensionless => "dimensionless",
            Dimension::Length => "length",
            Dimension::Time => "time",
            Dimension::Mass => "mass",
            Dimension::Angle => "angle",
            Dimension::Temperature => "temperature",
            Dimension::Velocity => "velocity",
            Dimension::AngularVelocity => "angular velocity",
            Dimension::Force => "force",
        };
        write!(f, "{}", name)
    }
}

/// A parsed unit: `base = scale * value + offset` in its dimension's base unit
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub symbol: String,
    pub dimension: Dimension,
    pub scale: f64,
    pub offset: f64,
}

/// Linear transform `y = factor * x + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub factor: f64,
    pub offset: f64,
}

impl UnitConversion {
    pub fn identity() -> Self {
        Self {
            factor: 1.0,
            offset: 0.0,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        self.factor * value + self.offset
    }

    pub fn is_identity(&self) -> bool {
        self.factor == 1.0 && self.offset == 0.0
    }
}

/// Unit parser and converter
pub trait UnitSystem: Send + Sync {
    /// Map a legacy unit spelling to its canonical form (identity if none)
    fn map_legacy_alias(&self, units: &str) -> String;

    /// Parse a unit string; `None` if it is not understood
    fn parse_unit(&self, units: &str) -> Option<Unit>;

    /// Converter from `from` to `to`; `None` if the units are incompatible
    fn converter_between(&self, from: &Unit, to: &Unit) -> Option<UnitConversion>;
}

/// Table-driven unit system with linear conversions
#[derive(Debug, Clone)]
pub struct LinearUnitSystem {
    units: HashMap<String, Unit>,
    aliases: HashMap<String, String>,
}

impl LinearUnitSystem {
    /// Unit system preloaded with the common engineering units
    pub fn new() -> Self {
        let mut system = Self {
            units: HashMap::new(),
            aliases: HashMap::new(),
        };

        use Dimension::*;
        for (symbol, dimension, scale) in [
            ("1", Dimensionless, 1.0),
            ("count", Dimensionless, 1.0),
            ("m", Length, 1.0),
            ("km", Length, 1000.0),
            ("cm", Length, 0.01),
            ("mm", Length, 0.001),
            ("ft", Length, 0.3048),
            ("in", Length, 0.0254),
            ("mi", Length, 1609.344),
            ("nmi", Length, 1852.0),
            ("s", Time, 1.0),
            ("ms", Time, 0.001),
            ("min", Time, 60.0),
            ("hr", Time, 3600.0),
            ("day", Time, 86400.0),
            ("kg", Mass, 1.0),
            ("g", Mass, 0.001),
            ("lbm", Mass, 0.453_592_37),
            ("slug", Mass, 14.593_902_937_206_364),
            ("rad", Angle, 1.0),
            ("degree", Angle, PI / 180.0),
            ("arcminute", Angle, PI / 10_800.0),
            ("arcsecond", Angle, PI / 648_000.0),
            ("revolution", Angle, 2.0 * PI),
            ("m/s", Velocity, 1.0),
            ("km/hr", Velocity, 1000.0 / 3600.0),
            ("ft/s", Velocity, 0.3048),
            ("mi/hr", Velocity, 0.447_04),
            ("knot", Velocity, 1852.0 / 3600.0),
            ("rad/s", AngularVelocity, 1.0),
            ("degree/s", AngularVelocity, PI / 180.0),
            ("revolution/min", AngularVelocity, 2.0 * PI / 60.0),
            ("N", Force, 1.0),
            ("kN", Force, 1000.0),
            ("lbf", Force, 4.448_221_615_260_5),
        ] {
            system.add_unit(symbol, dimension, scale, 0.0);
        }

        system.add_unit("K", Temperature, 1.0, 0.0);
        system.add_unit("Celsius", Temperature, 1.0, 273.15);
        system.add_unit("degF", Temperature, 5.0 / 9.0, 459.67 * 5.0 / 9.0);
        system.add_unit("degR", Temperature, 5.0 / 9.0, 0.0);

        for (legacy, canonical) in [
            ("M", "m"),
            ("d", "degree"),
            ("r", "rad"),
            ("sec", "s"),
            ("C", "Celsius"),
            ("F", "degF"),
            ("R", "degR"),
            ("mph", "mi/hr"),
            ("kph", "km/hr"),
            ("kt", "knot"),
            ("d/s", "degree/s"),
            ("r/s", "rad/s"),
            ("rpm", "revolution/min"),
            ("lb", "lbm"),
        ] {
            system.add_alias(legacy, canonical);
        }

        system
    }

    /// Register (or replace) a unit
    pub fn add_unit(&mut self, symbol: &str, dimension: Dimension, scale: f64, offset: f64) {
        self.units.insert(
            symbol.to_string(),
            Unit {
                symbol: symbol.to_string(),
                dimension,
                scale,
                offset,
            },
        );
    }

    /// Register a legacy spelling for a canonical unit
    pub fn add_alias(&mut self, legacy: &str, canonical: &str) {
        self.aliases.insert(legacy.to_string(), canonical.to_string());
    }
}

impl Default for LinearUnitSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitSystem for LinearUnitSystem {
    fn map_legacy_alias(&self, units: &str) -> String {
        self.aliases
            .get(units)
            .cloned()
            .unwrap_or_else(|| units.to_string())
    }

    fn parse_unit(&self, units: &str) -> Option<Unit> {
        self.units.get(units.trim()).cloned()
    }

    fn converter_between(&self, from: &Unit, to: &Unit) -> Option<UnitConversion> {
        if from.dimension != to.dimension || to.scale == 0.0 {
            return None;
        }

        Some(UnitConversion {
            factor: from.scale / to.scale,
            offset: (from.offset - to.offset) / to.scale,
        })
    }
}
