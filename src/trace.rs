//! Diagnostic notes from the room
//!
//! A `Tracer` receives human-readable lifecycle notes (joins, leaves,
//! relayed messages). It is picked once when the room is built, so call
//! sites never branch on whether diagnostics are enabled.

use std::fmt;
use std::io::Write;

/// Something capable of recording diagnostic notes
///
/// Implementations must never fail observably: a broken diagnostic
/// stream must not disturb message delivery.
pub trait Tracer: Send {
    /// Record one note, terminated by a line break
    fn trace(&mut self, note: fmt::Arguments<'_>);
}

/// Create a tracer that writes every note to `out`
pub fn new<W>(out: W) -> Box<dyn Tracer>
where
    W: Write + Send + 'static,
{
    Box::new(WriterTracer { out })
}

/// Create a tracer that ignores every note
pub fn off() -> Box<dyn Tracer> {
    Box::new(NilTracer)
}

struct WriterTracer<W> {
    out: W,
}

impl<W: Write + Send> Tracer for WriterTracer<W> {
    fn trace(&mut self, note: fmt::Arguments<'_>) {
        // Write errors are swallowed
        let _ = writeln!(self.out, "{}", note);
    }
}

struct NilTracer;

impl Tracer for NilTracer {
    fn trace(&mut self, _note: fmt::Arguments<'_>) {}
}
