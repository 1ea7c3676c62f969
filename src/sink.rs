//! Result sinks: where finished, display-ready output goes.

use std::io::Write;

use crate::error::Result;

/// Accepts results one at a time and prints them all at the end.
pub trait ResultSink {
    fn collect(&mut self, result: String);

    /// Flush every collected result. Called once, at task termination.
    fn print_all(&mut self) -> Result<()>;
}

/// Keeps results in memory and writes them out on [`ResultSink::print_all`].
pub struct Collector<W> {
    results: Vec<String>,
    out: W,
}

impl Collector<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> Collector<W> {
    pub fn new(out: W) -> Self {
        Self {
            results: Vec::new(),
            out,
        }
    }

    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> ResultSink for Collector<W> {
    fn collect(&mut self, result: String) {
        self.results.push(result);
    }

    fn print_all(&mut self) -> Result<()> {
        for result in self.results.drain(..) {
            writeln!(self.out, "{result}")?;
        }
        self.out.flush()?;
        Ok(())
    }
}
