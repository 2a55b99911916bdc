//! Symbol resolution
//!
//! Maps a variable name to the storage that backs it and a description of its
//! type. [`SymbolTable`] is an in-memory resolver whose cells hold the live
//! native-endian bytes of each variable.

use crate::types::{TypeDescriptor, VarKind};
use crate::wire::bits;
use byteorder::{ByteOrder, NativeEndian};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Shared handle to the live bytes of one simulation variable
#[derive(Debug, Clone)]
pub struct SimCell {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl SimCell {
    /// Create a zero-filled cell of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(vec![0u8; size])),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.read().len()
    }

    /// Snapshot the cell into `dest`, copying at most `dest.len()` bytes
    pub fn read_into(&self, dest: &mut [u8]) {
        let bytes = self.bytes.read();
        let n = dest.len().min(bytes.len());
        dest[..n].copy_from_slice(&bytes[..n]);
    }

    /// Overwrite the cell from `src`, copying at most the cell size
    pub fn write_bytes(&self, src: &[u8]) {
        let mut bytes = self.bytes.write();
        let n = src.len().min(bytes.len());
        bytes[..n].copy_from_slice(&src[..n]);
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    pub fn set_f64(&self, value: f64) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_f32(&self, value: f32) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_i64(&self, value: i64) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_u64(&self, value: u64) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_i32(&self, value: i32) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_u32(&self, value: u32) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_i16(&self, value: i16) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_u16(&self, value: u16) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_i8(&self, value: i8) {
        self.write_bytes(&value.to_ne_bytes());
    }

    pub fn set_u8(&self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn set_bool(&self, value: bool) {
        self.write_bytes(&[value as u8]);
    }

    /// Store `value` into a bit-field of the cell's integer word
    pub fn set_field(&self, start: usize, width: usize, value: u64) {
        let mut bytes = self.bytes.write();
        let size = bytes.len().min(8);
        if size == 0 {
            return;
        }
        let word = NativeEndian::read_uint(&bytes[..size], size);
        let updated = bits::insert_field(word, start, width, value);
        NativeEndian::write_uint(&mut bytes[..size], updated, size);
    }
}

/// Resolved storage of a variable: where its bytes live and how to read them
#[derive(Debug, Clone)]
pub struct Storage {
    pub cell: SimCell,
    pub descriptor: TypeDescriptor,
}

/// Resolves variable names to storage descriptors
pub trait SymbolResolver: Send + Sync {
    /// Look up `name` right now; `None` when it cannot be resolved
    fn resolve(&self, name: &str) -> Option<Storage>;
}

/// In-memory symbol table
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: RwLock<HashMap<String, Storage>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variable and return the cell that backs it
    ///
    /// Registering an existing name replaces its storage.
    pub fn insert(&self, name: impl Into<String>, descriptor: TypeDescriptor) -> SimCell {
        let size = match descriptor.kind {
            VarKind::Unresolved => 0,
            _ => descriptor.size,
        };
        let cell = SimCell::new(size);
        self.symbols.write().insert(
            name.into(),
            Storage {
                cell: cell.clone(),
                descriptor,
            },
        );
        cell
    }

    /// Remove a variable; later resolutions of the name fail
    pub fn remove(&self, name: &str) -> bool {
        self.symbols.write().remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }

    /// All registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.symbols.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, name: &str) -> Option<Storage> {
        self.symbols.read().get(name).cloned()
    }
}
