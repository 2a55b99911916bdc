//! TCP front end: one thread per connected client
//!
//! Each client gets a reader thread that turns the byte stream into lines and
//! a session loop that owns the [`VariableServerSession`]. The session loop
//! multiplexes three inputs:
//!
//! - command lines from the reader thread
//! - frame events from the model thread (scheduled and top-of-frame copies)
//! - its own wall-clock timer for asynchronous copies and writes

use crate::commands::{self, parse_line};
use crate::model::FrameBus;
use crate::scheduler::{self, FrameEvent};
use anyhow::{Context, Result};
use crossbeam_channel::{select, Receiver, Sender};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use var_server_session::{
    CopyMode, SessionConfig, SessionError, SessionServices, VariableServerSession, WriteMode,
};

/// Longest command line accepted from a client
const MAX_LINE_LEN: usize = 64 * 1024;

/// Shared by every client thread
#[derive(Clone)]
pub struct ServerContext {
    pub services: SessionServices,
    pub session_config: SessionConfig,
    pub bus: FrameBus,
    pub running: Arc<AtomicBool>,
    pub resource_dir: Option<PathBuf>,
}

enum ClientEvent {
    Line(String),
    Closed,
}

/// Accept clients until `running` is cleared
pub fn serve(listener: TcpListener, context: ServerContext) -> Result<()> {
    listener
        .set_nonblocking(true)
        .context("Failed to make listener non-blocking")?;
    log::info!("Variable server listening on {}", listener.local_addr()?);

    while context.running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let context = context.clone();
                thread::Builder::new()
                    .name(format!("session-{}", peer))
                    .spawn(move || {
                        if let Err(e) = run_client(stream, peer, context) {
                            log::error!("Session {} ended with error: {:#}", peer, e);
                        }
                    })
                    .context("Failed to spawn session thread")?;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                thread::sleep(Duration::from_millis(50));
            }
        }
    }
    Ok(())
}

fn run_client(stream: TcpStream, peer: SocketAddr, context: ServerContext) -> Result<()> {
    log::info!("Client connected: {}", peer);

    let reader = stream.try_clone().context("Failed to clone client stream")?;
    let control = stream.try_clone().context("Failed to clone client stream")?;
    stream
        .set_nonblocking(true)
        .context("Failed to make client stream non-blocking")?;

    let mut session = VariableServerSession::new(
        &context.session_config,
        context.services.clone(),
        Box::new(stream),
    )?;

    let alive = Arc::new(AtomicBool::new(true));
    let (line_tx, lines) = crossbeam_channel::unbounded();
    let reader_handle = spawn_reader(reader, peer, line_tx, Arc::clone(&alive))?;
    let frames = context.bus.subscribe();
    log::debug!("{} sessions receiving frames", context.bus.subscriber_count());

    let result = session_loop(&mut session, &lines, &frames, &context);

    alive.store(false, Ordering::Relaxed);
    let _ = control.shutdown(Shutdown::Both);
    if reader_handle.join().is_err() {
        log::warn!("Reader thread for {} panicked", peer);
    }
    log::info!("Client disconnected: {}", peer);
    result
}

fn session_loop(
    session: &mut VariableServerSession,
    lines: &Receiver<ClientEvent>,
    frames: &Receiver<FrameEvent>,
    context: &ServerContext,
) -> Result<()> {
    let mut next_async = Instant::now() + cycle_period(session);

    while context.running.load(Ordering::Relaxed) && !session.exit_requested() {
        let timeout = next_async.saturating_duration_since(Instant::now());

        let mut closed = false;
        select! {
            recv(lines) -> event => match event {
                Ok(ClientEvent::Line(line)) => handle_line(session, &line, context)?,
                Ok(ClientEvent::Closed) | Err(_) => closed = true,
            },
            recv(frames) -> event => {
                if let Ok(event) = event {
                    on_frame(session, &event)?;
                }
            },
            default(timeout) => {},
        }
        if closed {
            break;
        }

        if Instant::now() >= next_async {
            on_async_tick(session)?;
            next_async = Instant::now() + cycle_period(session);
        }
    }
    Ok(())
}

fn cycle_period(session: &VariableServerSession) -> Duration {
    let rate = session.cadence().update_rate();
    if rate.is_finite() && rate > 0.0 {
        Duration::from_secs_f64(rate)
    } else {
        Duration::from_millis(100)
    }
}

fn handle_line(
    session: &mut VariableServerSession,
    line: &str,
    context: &ServerContext,
) -> Result<()> {
    let command = match parse_line(line) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(()),
        Err(e) => {
            log::warn!("Ignoring command '{}': {}", line.trim(), e);
            return Ok(());
        }
    };

    log::debug!("Command: {:?}", command);
    match commands::execute(session, command, context.resource_dir.as_deref()) {
        Ok(()) => Ok(()),
        Err(e) => fatal_or_logged(e),
    }
}

/// Copy on frame boundaries when the cadence asks for it
fn on_frame(session: &mut VariableServerSession, event: &FrameEvent) -> Result<()> {
    if !scheduler::copy_due(session.cadence_mut(), event) {
        return Ok(());
    }
    session.copy_step();
    if session.get_pause() {
        return Ok(());
    }
    match session.write_if_due() {
        Ok(_) => Ok(()),
        Err(e) => fatal_or_logged(e),
    }
}

/// Wall-clock cycle: asynchronous copies and writes
fn on_async_tick(session: &mut VariableServerSession) -> Result<()> {
    let copy_mode = session.cadence().copy_mode();
    let write_mode = session.cadence().write_mode();

    if copy_mode == CopyMode::Async {
        session.copy_step();
    }
    if session.get_pause() {
        return Ok(());
    }
    if copy_mode == CopyMode::Async || write_mode == WriteMode::Async {
        if let Err(e) = session.write_data() {
            return fatal_or_logged(e);
        }
    }
    Ok(())
}

/// Transport failures end the session; everything else is reported and survived
fn fatal_or_logged(error: SessionError) -> Result<()> {
    match error {
        SessionError::ShortWrite { .. } | SessionError::IoError(_) => {
            Err(anyhow::Error::new(error).context("Client connection lost"))
        }
        other => {
            log::warn!("Command failed: {}", other);
            Ok(())
        }
    }
}

fn spawn_reader(
    mut stream: TcpStream,
    peer: SocketAddr,
    tx: Sender<ClientEvent>,
    alive: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("reader-{}", peer))
        .spawn(move || {
            let mut pending: Vec<u8> = Vec::new();
            let mut buffer = [0u8; 1024];

            while alive.load(Ordering::Relaxed) {
                match stream.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        pending.extend_from_slice(&buffer[..n]);
                        while let Some(end) = pending.iter().position(|&b| b == b'\n') {
                            let line: Vec<u8> = pending.drain(..=end).collect();
                            let line = String::from_utf8_lossy(&line).into_owned();
                            if tx.send(ClientEvent::Line(line)).is_err() {
                                return;
                            }
                        }
                        if pending.len() > MAX_LINE_LEN {
                            log::warn!("Client {} sent an overlong line, disconnecting", peer);
                            break;
                        }
                    }
                    Err(e)
                        if e.kind() == io::ErrorKind::WouldBlock
                            || e.kind() == io::ErrorKind::TimedOut
                            || e.kind() == io::ErrorKind::Interrupted =>
                    {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(e) => {
                        log::debug!("Read from {} failed: {}", peer, e);
                        break;
                    }
                }
            }
            let _ = tx.send(ClientEvent::Closed);
        })
        .context("Failed to spawn reader thread")
}
