use std::error::Error;
use std::io::{self, Write};

use tablebridge::Table;
use tracing::error;

/// Writes demonstration results. Logs go to stderr, this goes to stdout.
pub struct Printer<W: Write> {
    out: W,
}

impl Printer<io::BufWriter<io::Stdout>> {
    pub fn stdout() -> Self {
        Printer::new(io::BufWriter::new(io::stdout()))
    }
}

impl<W: Write> Printer<W> {
    pub fn new(out: W) -> Self {
        Printer { out }
    }

    pub fn line(&mut self, msg: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", msg.as_ref())
    }

    pub fn section(&mut self, title: &str) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "{title}:")
    }

    pub fn table(&mut self, title: &str, table: &Table) -> io::Result<()> {
        self.section(title)?;
        writeln!(self.out, "{table}")?;
        self.out.flush()
    }

    /// Report a failed step without ending the flow.
    pub fn report(&mut self, context: &str, err: &dyn Error) -> io::Result<()> {
        error!(%err, "{context}");
        writeln!(self.out, "{context}: {err}")?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
