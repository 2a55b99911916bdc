//! Session controller
//!
//! [`VariableServerSession`] ties the registry, cadence, copier and encoders
//! together behind the command surface a client drives. Setters only mutate
//! session state; `var_send*`, `var_exists`, `send_list_size` and `send_file`
//! are the only calls that put bytes on the transport.

use crate::binding::VariableBinding;
use crate::cadence::{CadenceController, WriteMode};
use crate::config::SessionConfig;
use crate::copier::{CommitOutcome, DoubleBufferCopier};
use crate::external::{SimClock, SymbolResolver, Transport, UnitSystem};
use crate::state::SessionState;
use crate::types::{MessageType, Result, SessionError};
use crate::units_converter::{UnitsConverter, UnitsOutcome};
use crate::wire::binary::encode_i32;
use crate::wire::{encode_ascii, BinaryPackets, WireValue};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// Chunk size used when streaming a resource file
pub const FILE_CHUNK_SIZE: usize = 4095;

/// The external collaborators a session consumes
#[derive(Clone)]
pub struct SessionServices {
    pub resolver: Arc<dyn SymbolResolver>,
    pub units: Arc<dyn UnitSystem>,
    pub clock: Arc<dyn SimClock>,
}

/// Result of one pass through the write path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Messages went out on the transport
    Sent { messages: usize, bytes: usize },
    /// Nothing was copied since the last write
    NothingStaged,
    /// The copy lock was busy; the cycle was skipped
    Contended,
    /// No variables to send
    Empty,
    /// The write mode does not write on copy
    Deferred,
}

impl WriteOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, WriteOutcome::Sent { .. })
    }
}

pub struct VariableServerSession {
    state: SessionState,
    copier: DoubleBufferCopier,
    services: SessionServices,
    transport: Box<dyn Transport>,
}

impl VariableServerSession {
    /// Create a session for one connected client
    pub fn new(
        config: &SessionConfig,
        services: SessionServices,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let state = SessionState::from_config(config, services.clock.as_ref());

        log::info!(
            "Session created: {} mode, cycle {}s, copy mode {:?}",
            if state.binary_mode { "binary" } else { "ascii" },
            state.cadence.update_rate(),
            state.cadence.copy_mode()
        );

        Ok(Self {
            state,
            copier: DoubleBufferCopier::new(),
            services,
            transport,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn cadence(&self) -> &CadenceController {
        &self.state.cadence
    }

    pub fn cadence_mut(&mut self) -> &mut CadenceController {
        &mut self.state.cadence
    }

    /// Handle on the copy lock, shareable with the simulation thread
    pub fn copier(&self) -> DoubleBufferCopier {
        self.copier.clone()
    }

    pub fn services(&self) -> &SessionServices {
        &self.services
    }

    /// Subscribed names in registry order
    pub fn subscribed_names(&self) -> Vec<String> {
        self.copier.registry().names()
    }

    // ---- subscriptions ----

    pub fn var_add(&mut self, name: &str) {
        self.copier.registry().add(name);
        log::debug!("var_add {}", name);
    }

    /// Subscribe and immediately request units
    ///
    /// The binding stays subscribed even if the units request fails.
    pub fn var_add_with_units(&mut self, name: &str, units: &str) -> Result<UnitsOutcome> {
        self.var_add(name);
        self.var_units(name, units)
    }

    pub fn var_remove(&mut self, name: &str) -> bool {
        let removed = self.copier.registry().remove(name);
        log::debug!("var_remove {} ({})", name, if removed { "removed" } else { "not found" });
        removed
    }

    pub fn var_clear(&mut self) {
        self.copier.registry().clear();
        log::debug!("var_clear");
    }

    /// Request that `name` be sent in `units`
    pub fn var_units(&mut self, name: &str, units: &str) -> Result<UnitsOutcome> {
        UnitsConverter::new(self.services.units.as_ref(), self.services.resolver.as_ref())
            .set_units(&self.copier, name, units)
    }

    /// Reply whether `name` resolves in the simulation
    pub fn var_exists(&mut self, name: &str) -> Result<bool> {
        let exists = self.services.resolver.resolve(name).is_some();

        let reply = if self.state.binary_mode {
            let mut reply = encode_i32(MessageType::VarExists.code(), self.state.byteswap).to_vec();
            reply.push(u8::from(exists));
            reply
        } else {
            format!("{}\t{}\n", MessageType::VarExists.code(), u8::from(exists)).into_bytes()
        };

        self.send(&reply)?;
        Ok(exists)
    }

    /// Reply with the number of subscribed variables
    pub fn send_list_size(&mut self) -> Result<usize> {
        let count = self.copier.registry().len();
        let code = MessageType::ListSize.code();

        let reply = if self.state.binary_mode {
            let swap = self.state.byteswap;
            let mut reply = Vec::with_capacity(12);
            reply.extend_from_slice(&encode_i32(code, swap));
            reply.extend_from_slice(&encode_i32(0, swap));
            reply.extend_from_slice(&encode_i32(count as i32, swap));
            reply
        } else {
            format!("{}\t{}\n", code, count).into_bytes()
        };

        self.send(&reply)?;
        Ok(count)
    }

    // ---- sending ----

    /// Copy the subscribed set and send it once
    pub fn var_send(&mut self) -> Result<WriteOutcome> {
        self.copier.stage_registry(self.services.resolver.as_ref());
        self.write_data()
    }

    /// Copy step for hosts that schedule copies themselves
    pub fn copy_step(&self) {
        self.copier.stage_registry(self.services.resolver.as_ref());
    }

    /// Write path: swap staged buffers and send the subscribed set
    ///
    /// Lock contention skips the cycle and returns success with nothing sent.
    pub fn write_data(&mut self) -> Result<WriteOutcome> {
        match self.copier.commit() {
            CommitOutcome::NothingStaged => Ok(WriteOutcome::NothingStaged),
            CommitOutcome::Contended => Ok(WriteOutcome::Contended),
            CommitOutcome::Committed(values) if values.is_empty() => Ok(WriteOutcome::Empty),
            CommitOutcome::Committed(values) => self.send_values(&values, MessageType::VarList),
        }
    }

    /// Write after a copy when the write mode asks for it
    pub fn write_if_due(&mut self) -> Result<WriteOutcome> {
        match self.state.cadence.write_mode() {
            WriteMode::WhenCopied => self.write_data(),
            WriteMode::Async => Ok(WriteOutcome::Deferred),
        }
    }

    /// Send a comma separated list of variables once, outside the registry
    ///
    /// `count` must match the number of names or nothing is sent. A single
    /// trailing comma does not start another name.
    pub fn var_send_once(&mut self, names: &str, count: i32) -> Result<WriteOutcome> {
        let mut names: Vec<&str> = names.split(',').map(str::trim).collect();
        if names.last() == Some(&"") {
            names.pop();
        }

        if names.len() as i64 != i64::from(count) {
            let err = SessionError::NameCountMismatch {
                given: names.len(),
                expected: count,
            };
            log::error!("Variable Server: {}", err);
            return Err(err);
        }
        if names.is_empty() {
            return Ok(WriteOutcome::Empty);
        }

        let mut bindings: Vec<VariableBinding> =
            names.into_iter().map(VariableBinding::new).collect();
        DoubleBufferCopier::stage_transient(&mut bindings, self.services.resolver.as_ref());

        match self.copier.commit_transient(&mut bindings) {
            Some(values) => self.send_values(&values, MessageType::SendOnce),
            None => Ok(WriteOutcome::Contended),
        }
    }

    fn send_values(&mut self, values: &[WireValue], message_type: MessageType) -> Result<WriteOutcome> {
        let mut messages = 0;
        let mut bytes = 0;

        if self.state.binary_mode {
            let packets = BinaryPackets::new(values, message_type, self.state.binary_options())
                .with_debug_level(self.state.debug_level);
            for packet in packets {
                self.send(&packet)?;
                messages += 1;
                bytes += packet.len();
            }
        } else {
            let message = encode_ascii(values, message_type);
            self.send(&message)?;
            messages = 1;
            bytes = message.len();
        }

        Ok(WriteOutcome::Sent { messages, bytes })
    }

    /// Stream a file to the client as a resource transfer
    ///
    /// Returns the number of file bytes sent.
    pub fn send_file(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let code = MessageType::SieResource.code();

        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Variable Server: cannot open {}: {}", path.display(), e);
                self.send(format!("{}\t-1\n", code).as_bytes())?;
                return Err(SessionError::FileTransfer(format!(
                    "cannot open {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let file_size = file.metadata()?.len();
        self.send(format!("{}\t{}\n", code, file_size).as_bytes())?;

        self.transport.set_blocking(true)?;
        let streamed = self.stream_file(&mut file, file_size);
        let restored = self.transport.set_blocking(false);

        let sent = streamed?;
        restored?;
        log::debug!("Sent {} ({} bytes)", path.display(), sent);
        Ok(sent)
    }

    fn stream_file(&mut self, file: &mut File, file_size: u64) -> Result<u64> {
        let mut chunk = [0u8; FILE_CHUNK_SIZE];
        let mut sent = 0u64;

        while sent < file_size {
            let filled = fill_chunk(file, &mut chunk)?;
            if filled == 0 {
                break;
            }
            self.send(&chunk[..filled])?;
            sent += filled as u64;
        }
        Ok(sent)
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let written = self.transport.write(bytes)?;
        if self.state.debug_level >= 2 {
            log::debug!("Variable Server sent {} of {} bytes", written, bytes.len());
        }
        if written != bytes.len() {
            log::error!(
                "Variable Server: failed to send message, sent {} of {} bytes",
                written,
                bytes.len()
            );
            return Err(SessionError::ShortWrite {
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }

    // ---- cadence ----

    pub fn var_cycle(&mut self, rate_seconds: f64) {
        self.state
            .cadence
            .set_cycle(rate_seconds, self.services.clock.as_ref());
    }

    pub fn var_sync(&mut self, mode: i32) {
        self.state.cadence.sync(mode, self.services.clock.as_ref());
    }

    pub fn var_set_copy_mode(&mut self, mode: i32) -> Result<()> {
        self.state
            .cadence
            .set_copy_mode(mode, self.services.clock.as_ref())
    }

    pub fn var_set_write_mode(&mut self, mode: i32) -> Result<()> {
        self.state.cadence.set_write_mode(mode)
    }

    pub fn var_set_frame_multiple(&mut self, multiple: u32) {
        self.state.cadence.set_frame_multiple(multiple);
    }

    pub fn var_set_frame_offset(&mut self, offset: u32) {
        self.state.cadence.set_frame_offset(offset);
    }

    pub fn var_set_freeze_frame_multiple(&mut self, multiple: u32) {
        self.state.cadence.set_freeze_frame_multiple(multiple);
    }

    pub fn var_set_freeze_frame_offset(&mut self, offset: u32) {
        self.state.cadence.set_freeze_frame_offset(offset);
    }

    // ---- format and control flags ----

    pub fn var_ascii(&mut self) {
        self.state.binary_mode = false;
    }

    pub fn var_binary(&mut self) {
        self.state.binary_mode = true;
    }

    /// Binary mode without names in the records
    pub fn var_binary_nonames(&mut self) {
        self.state.binary_mode = true;
        self.state.names_suppressed = true;
    }

    pub fn var_byteswap(&mut self, on: bool) {
        self.state.byteswap = on;
    }

    pub fn var_debug(&mut self, level: i32) {
        self.state.debug_level = level;
    }

    pub fn var_validate_address(&mut self, on: bool) {
        self.state.validate_address = on;
    }

    pub fn var_exit(&mut self) {
        log::info!("Client requested exit");
        self.state.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.state.exit_requested
    }

    pub fn get_pause(&self) -> bool {
        self.state.paused
    }

    pub fn set_pause(&mut self, on: bool) {
        self.state.paused = on;
    }

    pub fn get_send_stdio(&self) -> bool {
        self.state.send_stdio
    }

    pub fn set_send_stdio(&mut self, on: bool) {
        self.state.send_stdio = on;
    }
}

fn fill_chunk(file: &mut File, chunk: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < chunk.len() {
        match file.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadence::CopyMode;
    use crate::external::{LinearUnitSystem, ManualClock, MockTransport, SymbolTable};
    use crate::types::{TypeDescriptor, VarKind};

    fn session(config: SessionConfig) -> (VariableServerSession, Arc<SymbolTable>, MockTransport) {
        let table = Arc::new(SymbolTable::new());
        let cell = table.insert("speed", TypeDescriptor::scalar(VarKind::Double, "m/s"));
        cell.set_f64(2.5);
        let transport = MockTransport::new();
        let services = SessionServices {
            resolver: table.clone(),
            units: Arc::new(LinearUnitSystem::new()),
            clock: Arc::new(ManualClock::new(1000)),
        };
        let session =
            VariableServerSession::new(&config, services, Box::new(transport.clone())).unwrap();
        (session, table, transport)
    }

    #[test]
    fn test_setters_produce_no_traffic() {
        let (mut session, _, transport) = session(SessionConfig::default());
        session.var_add("speed");
        session.var_cycle(0.5);
        session.var_sync(1);
        session.var_binary();
        session.var_byteswap(true);
        session.var_debug(3);
        session.set_pause(true);
        session.var_set_frame_multiple(4);

        assert!(transport.packets().is_empty());
        assert!(session.get_pause());
        assert_eq!(session.cadence().copy_mode(), CopyMode::Scheduled);
        assert_eq!(session.cadence().frame_multiple(), 4);
    }

    #[test]
    fn test_var_send_ascii() {
        let (mut session, _, transport) = session(SessionConfig::default());
        session.var_add("speed");
        let outcome = session.var_send().unwrap();
        assert!(outcome.is_sent());
        assert_eq!(transport.written(), b"0\t2.5\n".to_vec());
    }

    #[test]
    fn test_write_data_without_copy_sends_nothing() {
        let (mut session, _, transport) = session(SessionConfig::default());
        session.var_add("speed");
        assert_eq!(session.write_data().unwrap(), WriteOutcome::NothingStaged);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_empty_registry_sends_nothing() {
        let (mut session, _, transport) = session(SessionConfig::default());
        assert_eq!(session.var_send().unwrap(), WriteOutcome::Empty);
        assert!(transport.written().is_empty());
    }

    #[test]
    fn test_write_if_due_respects_write_mode() {
        let (mut session, _, transport) = session(SessionConfig::default());
        session.var_add("speed");
        session.copy_step();
        assert_eq!(session.write_if_due().unwrap(), WriteOutcome::Deferred);
        assert!(transport.written().is_empty());

        session.var_set_write_mode(1).unwrap();
        assert!(session.write_if_due().unwrap().is_sent());
    }

    #[test]
    fn test_invalid_mode_leaves_state() {
        let (mut session, _, _) = session(SessionConfig::default());
        assert!(session.var_set_copy_mode(7).is_err());
        assert!(session.var_set_write_mode(-1).is_err());
        assert_eq!(session.cadence().copy_mode(), CopyMode::Async);
        assert_eq!(session.cadence().write_mode(), WriteMode::Async);
    }

    #[test]
    fn test_binary_nonames_flags() {
        let (mut session, _, _) = session(SessionConfig::default());
        session.var_binary_nonames();
        assert!(session.state().binary_mode);
        assert!(session.state().names_suppressed);
        session.var_ascii();
        assert!(!session.state().binary_mode);
    }

    #[test]
    fn test_exit_flag() {
        let (mut session, _, _) = session(SessionConfig::default());
        assert!(!session.exit_requested());
        session.var_exit();
        assert!(session.exit_requested());
    }
}
