use std::io;
use std::io::Write;
use term;
use term::{Attr, Terminal, StderrTerminal};
use term::color::Color;

// a terminal which passes writes through and rejects any styling,
// used when stderr is redirected or no terminfo is available
struct PlainTerminal<W> {
    writer: W,
}

impl<W: Write> Write for PlainTerminal<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> { self.writer.write(buf) }
    fn flush(&mut self) -> io::Result<()> { self.writer.flush() }
}

impl<W: Write> Terminal for PlainTerminal<W> {
    type Output = W;

    fn fg(&mut self, _: Color) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn bg(&mut self, _: Color) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn attr(&mut self, _: Attr) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn supports_attr(&self, _: Attr) -> bool { false }
    fn reset(&mut self) -> term::Result<()> { Ok(()) }
    fn supports_reset(&self) -> bool { false }
    fn supports_color(&self) -> bool { false }
    fn cursor_up(&mut self) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn delete_line(&mut self) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn carriage_return(&mut self) -> term::Result<()> { Err(term::Error::NotSupported) }
    fn get_ref(&self) -> &W { &self.writer }
    fn get_mut(&mut self) -> &mut W { &mut self.writer }
    fn into_inner(self) -> W where Self: Sized { self.writer }
}

pub fn stderr_or_plain() -> Box<StderrTerminal> {
    match term::stderr() {
        Some(t) => t,
        None => Box::new(PlainTerminal { writer: io::stderr() }),
    }
}
