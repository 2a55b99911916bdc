//! Variable bindings
//!
//! A binding is one client subscription: the variable name, its lazily
//! resolved storage, the units requested for it and a pair of value buffers.
//! The copy step writes into the input buffer; the writer reads the output
//! buffer. The two only trade places through [`VariableBinding::prepare_for_write`],
//! which callers invoke while holding the session's copy lock.

use crate::external::{Storage, SymbolResolver, UnitConversion};
use crate::types::{SimValue, VarKind};
use crate::wire::WireValue;
use std::sync::Arc;

/// Units state of a binding
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnitsState {
    /// Units the simulation declares for the variable ("--" until resolved)
    pub current: String,
    /// Units requested by the client, if any
    pub target: Option<Arc<str>>,
    /// Transform from `current` to `target`
    pub conversion: Option<UnitConversion>,
}

/// One value snapshot: the kind it was copied as plus its raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct ValueBuffer {
    pub kind: VarKind,
    pub bytes: Vec<u8>,
}

impl Default for ValueBuffer {
    fn default() -> Self {
        Self {
            kind: VarKind::Unresolved,
            bytes: Vec::new(),
        }
    }
}

impl ValueBuffer {
    /// Decode the buffer into a value
    pub fn value(&self) -> SimValue {
        self.kind.read_native(&self.bytes)
    }
}

/// A client's subscription to one named simulation variable
#[derive(Debug, Clone)]
pub struct VariableBinding {
    name: Arc<str>,
    storage: Option<Storage>,
    units: UnitsState,
    buffer_in: ValueBuffer,
    buffer_out: ValueBuffer,
    staged: bool,
}

impl VariableBinding {
    /// Create an unresolved binding; resolution happens on first use
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            storage: None,
            units: UnitsState {
                current: "--".to_string(),
                ..UnitsState::default()
            },
            buffer_in: ValueBuffer::default(),
            buffer_out: ValueBuffer::default(),
            staged: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> Option<&Storage> {
        self.storage.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.storage.is_some()
    }

    pub fn units(&self) -> &UnitsState {
        &self.units
    }

    /// Whether the input buffer holds data not yet swapped to the output side
    pub fn is_staged(&self) -> bool {
        self.staged
    }

    /// Output buffer, as read by the encoder
    pub fn output(&self) -> &ValueBuffer {
        &self.buffer_out
    }

    /// Try to resolve the binding if it is not resolved yet
    ///
    /// Returns whether the binding is resolved afterwards. Resolution adopts
    /// the variable's declared units as the binding's current units.
    pub fn resolve(&mut self, resolver: &dyn SymbolResolver) -> bool {
        if self.storage.is_none() {
            if let Some(storage) = resolver.resolve(&self.name) {
                log::trace!(
                    "Resolved '{}' as {:?} ({} bytes, units {})",
                    self.name,
                    storage.descriptor.kind,
                    storage.descriptor.size,
                    storage.descriptor.units
                );
                self.units.current = storage.descriptor.units.clone();
                self.storage = Some(storage);
            }
        }
        self.storage.is_some()
    }

    /// Install a new target unit and conversion, replacing any previous one
    pub fn set_conversion(&mut self, target: impl Into<Arc<str>>, conversion: UnitConversion) {
        self.units.target = Some(target.into());
        self.units.conversion = Some(conversion);
    }

    /// Copy step: snapshot the live value into the input buffer
    ///
    /// Unresolvable names are re-tried here and copied as an unresolved
    /// placeholder when they still fail.
    pub fn copy_from_storage(&mut self, resolver: &dyn SymbolResolver) {
        self.resolve(resolver);

        match &self.storage {
            Some(storage) => {
                let size = storage.descriptor.size;
                self.buffer_in.kind = storage.descriptor.kind;
                self.buffer_in.bytes.resize(size, 0);
                storage.cell.read_into(&mut self.buffer_in.bytes);
            }
            None => {
                self.buffer_in.kind = VarKind::Unresolved;
                self.buffer_in.bytes.clear();
                self.buffer_in.bytes.resize(VarKind::Unresolved.wire_size(), 0);
            }
        }
        self.staged = true;
    }

    /// Swap input and output buffers if the input holds fresh data
    ///
    /// Must be called with the session copy lock held.
    pub fn prepare_for_write(&mut self) -> bool {
        if !self.staged {
            return false;
        }
        std::mem::swap(&mut self.buffer_in, &mut self.buffer_out);
        self.staged = false;
        true
    }

    /// Move the output side out as the snapshot handed to the encoder
    ///
    /// The output buffer is left empty; the next swap refills it. Name and
    /// units are shared, not copied.
    pub fn take_wire_value(&mut self) -> WireValue {
        let output = std::mem::take(&mut self.buffer_out);
        WireValue {
            name: Arc::clone(&self.name),
            kind: output.kind,
            bytes: output.bytes,
            conversion: self.units.conversion,
            units: self.units.target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::SymbolTable;
    use crate::types::TypeDescriptor;

    #[test]
    fn test_new_binding_is_unresolved() {
        let binding = VariableBinding::new("ball.pos");
        assert_eq!(binding.name(), "ball.pos");
        assert!(!binding.is_resolved());
        assert_eq!(binding.units().current, "--");
        assert_eq!(binding.output().value(), SimValue::Unresolved);
    }

    #[test]
    fn test_lazy_resolution_retries() {
        let table = SymbolTable::new();
        let mut binding = VariableBinding::new("ball.pos");
        assert!(!binding.resolve(&table));

        table.insert("ball.pos", TypeDescriptor::scalar(VarKind::Double, "ft"));
        assert!(binding.resolve(&table));
        assert_eq!(binding.units().current, "ft");
    }

    #[test]
    fn test_copy_and_swap() {
        let table = SymbolTable::new();
        let cell = table.insert("n", TypeDescriptor::scalar(VarKind::Int, "1"));
        let mut binding = VariableBinding::new("n");

        cell.set_i32(7);
        binding.copy_from_storage(&table);
        assert!(binding.is_staged());
        // Output untouched until the swap
        assert_eq!(binding.output().value(), SimValue::Unresolved);

        assert!(binding.prepare_for_write());
        assert_eq!(binding.output().value(), SimValue::Integer(7));
        assert!(!binding.prepare_for_write());

        // A new copy lands in the other buffer
        cell.set_i32(8);
        binding.copy_from_storage(&table);
        assert_eq!(binding.output().value(), SimValue::Integer(7));
        binding.prepare_for_write();
        assert_eq!(binding.output().value(), SimValue::Integer(8));
    }

    #[test]
    fn test_copy_unresolved_placeholder() {
        let table = SymbolTable::new();
        let mut binding = VariableBinding::new("missing");
        binding.copy_from_storage(&table);
        binding.prepare_for_write();

        let value = binding.take_wire_value();
        assert_eq!(value.kind, VarKind::Unresolved);
        assert_eq!(value.bytes, vec![0u8; 4]);
    }

    #[test]
    fn test_take_wire_value_moves_output() {
        let table = SymbolTable::new();
        let cell = table.insert("alt", TypeDescriptor::scalar(VarKind::Double, "ft"));
        let mut binding = VariableBinding::new("alt");
        binding.set_conversion("m", UnitConversion { factor: 0.3048, offset: 0.0 });

        cell.set_f64(10.0);
        binding.copy_from_storage(&table);
        binding.prepare_for_write();
        let value = binding.take_wire_value();

        assert_eq!(value.bytes, 10.0f64.to_ne_bytes().to_vec());
        assert_eq!(value.units.as_deref(), Some("m"));
        assert!(std::ptr::eq(value.name.as_ptr(), binding.name().as_ptr()));
        assert!(binding.output().bytes.is_empty());
    }
}
