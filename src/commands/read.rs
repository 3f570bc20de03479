//! Read commands: memrd and readtofile

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{with_session, CmdResult, Context};
use nrfprog_core::memory::{write_lines, DumpSelection};
use nrfprog_core::Error;

/// Adapts an `io::Write` to the text sink the dump writes into
///
/// `fmt::Error` carries no detail, so the I/O error is kept for reporting.
pub struct IoSink<W: Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: Write> IoSink<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    /// The I/O error that made the last write fail, if any
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> fmt::Write for IoSink<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|e| {
            self.error = Some(e);
            fmt::Error
        })
    }
}

/// Run the memrd command
pub fn cmd_memrd(ctx: &Context, addr: u32, length: u32) -> CmdResult {
    log::info!("Reading {} byte(s) at 0x{:08X}", length, addr);
    with_session(ctx, |session| {
        let data = session.memory()?.read(addr, length)?;
        let mut out = String::new();
        write_lines(&mut out, addr, &data)?;
        print!("{}", out);
        Ok(())
    })
}

/// Run the readtofile command
pub fn cmd_readtofile(ctx: &Context, file: &Path, selection: DumpSelection) -> CmdResult {
    let selection = selection.or_default();
    log::info!("Reading {:?} into {}", selection, file.display());

    let mut sink = IoSink::new(BufWriter::new(File::create(file)?));
    with_session(ctx, |session| {
        let mut progress = ctx.progress();
        let result = session.memory()?.dump(selection, &mut sink, &mut progress);
        progress.finish();
        match result {
            Err(Error::Output) => match sink.take_error() {
                Some(e) => Err(e.into()),
                None => Err(Error::Output.into()),
            },
            other => Ok(other?),
        }
    })?;

    sink.into_inner().flush()?;
    println!("Wrote {}", file.display());
    Ok(())
}
