//! OpenOCD TCL RPC protocol
//!
//! Commands and replies are plain Tcl text, each terminated by a single
//! 0x1A byte. OpenOCD reports command errors only as text, so every command
//! is wrapped as `list [catch {<cmd>} r] $r`, which turns the reply into a
//! two-element list: the status code and the result (or error message).

use crate::error::{OpenOcdError, Result};
use crate::transport::Transport;

/// Default TCL RPC port
pub const DEFAULT_PORT: u16 = 6666;

/// Message terminator
pub const TERMINATOR: u8 = 0x1A;

/// Wrap a command so its reply carries an explicit status
pub fn wrap_command(command: &str) -> String {
    format!("list [catch {{{}}} r] $r", command)
}

/// Split a wrapped reply into status and result
///
/// A zero status yields the result; anything else becomes
/// [`OpenOcdError::CommandFailed`].
pub fn parse_reply(command: &str, reply: &str) -> Result<String> {
    let reply = reply.trim();
    let (code, rest) = match reply.split_once(' ') {
        Some((code, rest)) => (code, rest.trim()),
        None => (reply, ""),
    };
    let code: i32 = code
        .parse()
        .map_err(|_| OpenOcdError::InvalidResponse(reply.to_string()))?;
    let value = list_element(rest);

    if code == 0 {
        Ok(value)
    } else {
        Err(OpenOcdError::CommandFailed {
            command: command.to_string(),
            message: value,
        })
    }
}

/// Unquote a single Tcl list element
fn list_element(s: &str) -> String {
    if let Some(inner) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        return inner.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Parse a number in Tcl notation (`0x` hex or decimal)
pub fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|_| OpenOcdError::InvalidResponse(format!("not a number: {:?}", s)))
}

/// Parse the whitespace-separated values returned by `read_memory`
pub fn parse_values(s: &str) -> Result<Vec<u32>> {
    s.split_whitespace().map(parse_u32).collect()
}

/// Format values as a Tcl list for `write_memory`
pub fn format_values<I: IntoIterator<Item = u32>>(values: I) -> String {
    let items: Vec<String> = values.into_iter().map(|v| format!("0x{:x}", v)).collect();
    format!("{{{}}}", items.join(" "))
}

/// Extract a register value from a `get_reg` dictionary (`pc 0x000000c0`)
pub fn parse_reg_value(reply: &str, name: &str) -> Result<u32> {
    let mut words = reply.split_whitespace();
    while let Some(key) = words.next() {
        let value = words
            .next()
            .ok_or_else(|| OpenOcdError::InvalidResponse(reply.to_string()))?;
        if key.eq_ignore_ascii_case(name) {
            return parse_u32(value);
        }
    }
    Err(OpenOcdError::InvalidResponse(format!(
        "register {} missing from {:?}",
        name, reply
    )))
}

/// Framed command client on top of a transport
pub struct TclClient<T: Transport> {
    transport: T,
    rx: Vec<u8>,
}

impl<T: Transport> TclClient<T> {
    /// Create a client; the transport is opened separately
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rx: Vec::new(),
        }
    }

    /// Open the underlying transport
    pub fn open(&mut self) -> Result<()> {
        self.rx.clear();
        self.transport.open()
    }

    /// Close the underlying transport
    pub fn close(&mut self) -> Result<()> {
        self.transport.close()
    }

    /// Run a command and return its result text
    pub fn execute(&mut self, command: &str) -> Result<String> {
        log::trace!("openocd> {}", command);
        let mut msg = wrap_command(command).into_bytes();
        msg.push(TERMINATOR);
        self.transport.write(&msg)?;

        let reply = self.read_message()?;
        log::trace!("openocd< {}", reply);
        parse_reply(command, &reply)
    }

    fn read_message(&mut self) -> Result<String> {
        loop {
            if let Some(end) = self.rx.iter().position(|&b| b == TERMINATOR) {
                let msg: Vec<u8> = self.rx.drain(..=end).take(end).collect();
                return String::from_utf8(msg)
                    .map_err(|e| OpenOcdError::InvalidResponse(e.to_string()));
            }
            let mut buf = [0u8; 4096];
            let n = self.transport.read(&mut buf)?;
            self.rx.extend_from_slice(&buf[..n]);
        }
    }

    /// Access the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
