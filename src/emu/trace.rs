use std::io::{self, Write};

use super::Opcode;

/// Receives one record per executed instruction.
pub trait TraceSink {
    /// `pc` is the address the instruction was fetched from.
    fn record(&mut self, pc: u16, raw: u16, opcode: &Opcode);
}

/// Forwards instruction records to the `log` facade at trace level.
#[derive(Default)]
pub struct LogTrace;

impl TraceSink for LogTrace {
    fn record(&mut self, pc: u16, raw: u16, opcode: &Opcode) {
        log::trace!("pc: {pc:04x} instr {raw:04x}: {opcode}");
    }
}

/// Writes one line per instruction to any writer.
///
/// The first write error is kept and disables further output; stepping the
/// machine never fails because of the trace.
pub struct WriterTrace<W: Write> {
    writer: W,
    error: Option<io::Error>,
}

impl<W: Write> WriterTrace<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TraceSink for WriterTrace<W> {
    fn record(&mut self, pc: u16, raw: u16, opcode: &Opcode) {
        if self.error.is_some() {
            return;
        }

        if let Err(e) = writeln!(self.writer, "pc: {pc:04x} instr {raw:04x}: {opcode}") {
            self.error = Some(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingWriter {
        attempts: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            Err(io::Error::other("disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_one_line_per_record() {
        let mut trace = WriterTrace::new(Vec::new());
        trace.record(0x200, 0x00E0, &Opcode::decode(0x00E0));
        trace.record(0x202, 0x6105, &Opcode::decode(0x6105));

        let out = String::from_utf8(trace.into_inner()).unwrap();
        assert_eq!(
            out,
            "pc: 0200 instr 00e0: CLS\npc: 0202 instr 6105: LD V1, 0x05\n"
        );
    }

    #[test]
    fn stops_writing_after_first_error() {
        let mut trace = WriterTrace::new(FailingWriter { attempts: 0 });
        trace.record(0x200, 0x00E0, &Opcode::ClearDisplay);
        trace.record(0x202, 0x00E0, &Opcode::ClearDisplay);

        assert!(trace.take_error().is_some());
        assert_eq!(trace.into_inner().attempts, 1);
    }
}
