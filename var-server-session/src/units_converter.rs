//! Units conversion requests
//!
//! Turns a client's "send this variable in these units" request into a linear
//! transform stored on the binding. The transform is only applied when values
//! are serialized; the simulation value itself is never touched.

use crate::copier::DoubleBufferCopier;
use crate::external::{SymbolResolver, UnitConversion, UnitSystem};
use crate::types::{Result, SessionError};

/// Requested units meaning "keep the variable's current units"
pub const KEEP_UNITS: &str = "xx";

/// Requested units meaning "explicitly unitless, do not convert"
pub const UNITLESS: &str = "--";

/// What a units request did
#[derive(Debug, Clone, PartialEq)]
pub enum UnitsOutcome {
    /// No binding has that name; nothing changed
    NoSuchVariable,
    /// Unitless request; nothing changed
    Unitless,
    /// Conversion installed with the given canonical target units
    Converted(String),
}

pub struct UnitsConverter<'a> {
    units: &'a dyn UnitSystem,
    resolver: &'a dyn SymbolResolver,
}

impl<'a> UnitsConverter<'a> {
    pub fn new(units: &'a dyn UnitSystem, resolver: &'a dyn SymbolResolver) -> Self {
        Self { units, resolver }
    }

    /// Apply `target` units to the first binding named `name`
    ///
    /// The copy lock is taken to read the declared units and again to install
    /// the result, never while the conversion is worked out. On any failure
    /// the binding's previous units and transform are kept.
    pub fn set_units(
        &self,
        copier: &DoubleBufferCopier,
        name: &str,
        target: &str,
    ) -> Result<UnitsOutcome> {
        let current = {
            let mut registry = copier.registry();
            match registry.find_mut(name) {
                Some(binding) => {
                    binding.resolve(self.resolver);
                    binding.units().current.clone()
                }
                None => {
                    log::debug!("Units request for unknown variable '{}' ignored", name);
                    return Ok(UnitsOutcome::NoSuchVariable);
                }
            }
        };

        match self.conversion_for(name, &current, target)? {
            Some((canonical, conversion)) => {
                if let Some(binding) = copier.registry().find_mut(name) {
                    binding.set_conversion(canonical.as_str(), conversion);
                }
                Ok(UnitsOutcome::Converted(canonical))
            }
            None => Ok(UnitsOutcome::Unitless),
        }
    }

    /// Work out the canonical target units and transform for a request
    ///
    /// `current` is the variable's declared units. Returns `None` for a
    /// unitless request. Touches no binding.
    pub fn conversion_for(
        &self,
        variable: &str,
        current: &str,
        target: &str,
    ) -> Result<Option<(String, UnitConversion)>> {
        let requested = if target == KEEP_UNITS { current } else { target };

        if requested == UNITLESS {
            return Ok(None);
        }

        let canonical = self.units.map_legacy_alias(requested);
        if canonical != requested {
            log::warn!(
                "Variable Server: [{}] old-style units converted from [{}] to [{}]",
                variable,
                requested,
                canonical
            );
        }

        let unit_error = |units: &str| {
            log::error!("Variable Server: units error for [{}] [{}]", variable, units);
            SessionError::UnitParse {
                variable: variable.to_string(),
                units: units.to_string(),
            }
        };

        let from = self.units.parse_unit(current).ok_or_else(|| unit_error(current))?;
        let to = self
            .units
            .parse_unit(&canonical)
            .ok_or_else(|| unit_error(&canonical))?;

        let conversion = self.units.converter_between(&from, &to).ok_or_else(|| {
            log::error!(
                "Variable Server: [{}] cannot convert units from [{}] to [{}]",
                variable,
                current,
                canonical
            );
            SessionError::IncompatibleUnits {
                variable: variable.to_string(),
                from: current.to_string(),
                to: canonical.clone(),
            }
        })?;

        Ok(Some((canonical, conversion)))
    }
}
