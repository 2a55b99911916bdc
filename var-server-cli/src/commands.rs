//! Client command front end
//!
//! Accepts both the call form clients traditionally send
//! (`trick.var_add("ball.state.output_position[0]", "ft")`) and a plain
//! whitespace form (`var_add ball.state.output_position[0] ft`), and maps each
//! line onto a session call.

use std::path::PathBuf;
use thiserror::Error;
use var_server_session::{Result as SessionResult, VariableServerSession};

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),

    #[error("{command}: expected {expected} argument(s), got {got}")]
    Arity {
        command: String,
        expected: &'static str,
        got: usize,
    },

    #[error("{command}: bad argument '{value}'")]
    BadArgument { command: String, value: String },

    #[error("Unterminated quote in: {0}")]
    UnterminatedQuote(String),
}

/// One parsed client command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    VarAdd { name: String, units: Option<String> },
    VarRemove(String),
    VarUnits { name: String, units: String },
    VarClear,
    VarExists(String),
    VarSend,
    VarSendOnce { names: String, count: i32 },
    VarSendListSize,
    VarCycle(f64),
    VarSync(i32),
    VarSetCopyMode(i32),
    VarSetWriteMode(i32),
    VarSetFrameMultiple(u32),
    VarSetFrameOffset(u32),
    VarSetFreezeFrameMultiple(u32),
    VarSetFreezeFrameOffset(u32),
    VarAscii,
    VarBinary,
    VarBinaryNonames,
    VarByteswap(bool),
    VarDebug(i32),
    VarValidateAddress(bool),
    VarPause,
    VarUnpause,
    SetSendStdio(bool),
    SendFile(PathBuf),
    VarExit,
}

/// Parse one line; `Ok(None)` for blank lines and comments
pub fn parse_line(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, args) = split_call(line)?;
    let verb = verb.strip_prefix("trick.").unwrap_or(&verb).to_string();
    parse_command(&verb, &args).map(Some)
}

fn split_call(line: &str) -> Result<(String, Vec<String>), CommandError> {
    match line.find('(') {
        Some(open) => {
            let verb = line[..open].trim().to_string();
            let rest = line[open + 1..].trim_end();
            let inner = rest.strip_suffix(')').unwrap_or(rest);
            Ok((verb, split_arguments(inner, ',')?))
        }
        None => {
            let mut parts = line.splitn(2, char::is_whitespace);
            let verb = parts.next().unwrap_or_default().to_string();
            let args = split_arguments(parts.next().unwrap_or_default(), ' ')?;
            Ok((verb, args))
        }
    }
}

/// Split on `separator` outside of quotes, dropping the quotes
fn split_arguments(input: &str, separator: char) -> Result<Vec<String>, CommandError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut quoted = false;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                quoted = true;
            }
            None if c == separator || (separator == ' ' && c.is_whitespace()) => {
                push_argument(&mut args, &mut current, &mut quoted);
            }
            None => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote(input.to_string()));
    }
    push_argument(&mut args, &mut current, &mut quoted);
    Ok(args)
}

fn push_argument(args: &mut Vec<String>, current: &mut String, quoted: &mut bool) {
    let arg = std::mem::take(current).trim().to_string();
    if *quoted || !arg.is_empty() {
        args.push(arg);
    }
    *quoted = false;
}

fn parse_command(verb: &str, args: &[String]) -> Result<Command, CommandError> {
    let arity = |expected: &'static str| CommandError::Arity {
        command: verb.to_string(),
        expected,
        got: args.len(),
    };
    let one = || match args {
        [arg] => Ok(arg.clone()),
        _ => Err(arity("1")),
    };
    let none = |command: Command| {
        if args.is_empty() {
            Ok(command)
        } else {
            Err(arity("0"))
        }
    };

    match verb {
        "var_add" => match args {
            [name] => Ok(Command::VarAdd {
                name: name.clone(),
                units: None,
            }),
            [name, units] => Ok(Command::VarAdd {
                name: name.clone(),
                units: Some(units.clone()),
            }),
            _ => Err(arity("1 or 2")),
        },
        "var_remove" => one().map(Command::VarRemove),
        "var_units" => match args {
            [name, units] => Ok(Command::VarUnits {
                name: name.clone(),
                units: units.clone(),
            }),
            _ => Err(arity("2")),
        },
        "var_clear" => none(Command::VarClear),
        "var_exists" => one().map(Command::VarExists),
        "var_send" => none(Command::VarSend),
        "var_send_once" => match args {
            [names] => Ok(Command::VarSendOnce {
                names: names.clone(),
                count: names.split(',').count() as i32,
            }),
            [names, count] => Ok(Command::VarSendOnce {
                names: names.clone(),
                count: number(verb, count)?,
            }),
            _ => Err(arity("1 or 2")),
        },
        "var_send_list_size" => none(Command::VarSendListSize),
        "var_cycle" => Ok(Command::VarCycle(number(verb, &one()?)?)),
        "var_sync" => Ok(Command::VarSync(number(verb, &one()?)?)),
        "var_set_copy_mode" => Ok(Command::VarSetCopyMode(number(verb, &one()?)?)),
        "var_set_write_mode" => Ok(Command::VarSetWriteMode(number(verb, &one()?)?)),
        "var_set_frame_multiple" => Ok(Command::VarSetFrameMultiple(number(verb, &one()?)?)),
        "var_set_frame_offset" => Ok(Command::VarSetFrameOffset(number(verb, &one()?)?)),
        "var_set_freeze_frame_multiple" => {
            Ok(Command::VarSetFreezeFrameMultiple(number(verb, &one()?)?))
        }
        "var_set_freeze_frame_offset" => {
            Ok(Command::VarSetFreezeFrameOffset(number(verb, &one()?)?))
        }
        "var_ascii" => none(Command::VarAscii),
        "var_binary" => none(Command::VarBinary),
        "var_binary_nonames" => none(Command::VarBinaryNonames),
        "var_byteswap" => Ok(Command::VarByteswap(flag(verb, &one()?)?)),
        "var_debug" => Ok(Command::VarDebug(number(verb, &one()?)?)),
        "var_validate_address" => Ok(Command::VarValidateAddress(flag(verb, &one()?)?)),
        "var_pause" => none(Command::VarPause),
        "var_unpause" => none(Command::VarUnpause),
        "set_send_stdio" => Ok(Command::SetSendStdio(flag(verb, &one()?)?)),
        "send_file" => one().map(|path| Command::SendFile(PathBuf::from(path))),
        "var_exit" => none(Command::VarExit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn number<T: std::str::FromStr>(command: &str, value: &str) -> Result<T, CommandError> {
    value.trim().parse().map_err(|_| CommandError::BadArgument {
        command: command.to_string(),
        value: value.to_string(),
    })
}

fn flag(command: &str, value: &str) -> Result<bool, CommandError> {
    match value.trim() {
        "1" | "true" | "True" | "TRUE" => Ok(true),
        "0" | "false" | "False" | "FALSE" => Ok(false),
        _ => Err(CommandError::BadArgument {
            command: command.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Run a parsed command against the session
///
/// `resource_dir` anchors relative `send_file` paths.
pub fn execute(
    session: &mut VariableServerSession,
    command: Command,
    resource_dir: Option<&std::path::Path>,
) -> SessionResult<()> {
    match command {
        Command::VarAdd { name, units: None } => session.var_add(&name),
        Command::VarAdd {
            name,
            units: Some(units),
        } => {
            session.var_add_with_units(&name, &units)?;
        }
        Command::VarRemove(name) => {
            session.var_remove(&name);
        }
        Command::VarUnits { name, units } => {
            session.var_units(&name, &units)?;
        }
        Command::VarClear => session.var_clear(),
        Command::VarExists(name) => {
            session.var_exists(&name)?;
        }
        Command::VarSend => {
            session.var_send()?;
        }
        Command::VarSendOnce { names, count } => {
            session.var_send_once(&names, count)?;
        }
        Command::VarSendListSize => {
            session.send_list_size()?;
        }
        Command::VarCycle(rate) => session.var_cycle(rate),
        Command::VarSync(mode) => session.var_sync(mode),
        Command::VarSetCopyMode(mode) => session.var_set_copy_mode(mode)?,
        Command::VarSetWriteMode(mode) => session.var_set_write_mode(mode)?,
        Command::VarSetFrameMultiple(multiple) => session.var_set_frame_multiple(multiple),
        Command::VarSetFrameOffset(offset) => session.var_set_frame_offset(offset),
        Command::VarSetFreezeFrameMultiple(multiple) => {
            session.var_set_freeze_frame_multiple(multiple)
        }
        Command::VarSetFreezeFrameOffset(offset) => session.var_set_freeze_frame_offset(offset),
        Command::VarAscii => session.var_ascii(),
        Command::VarBinary => session.var_binary(),
        Command::VarBinaryNonames => session.var_binary_nonames(),
        Command::VarByteswap(on) => session.var_byteswap(on),
        Command::VarDebug(level) => session.var_debug(level),
        Command::VarValidateAddress(on) => session.var_validate_address(on),
        Command::VarPause => session.set_pause(true),
        Command::VarUnpause => session.set_pause(false),
        Command::SetSendStdio(on) => session.set_send_stdio(on),
        Command::SendFile(path) => {
            let path = match resource_dir {
                Some(dir) if path.is_relative() => dir.join(path),
                _ => path,
            };
            session.send_file(path)?;
        }
        Command::VarExit => session.var_exit(),
    }
    Ok(())
}
