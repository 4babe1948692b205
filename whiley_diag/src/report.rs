use std::cmp;
use std::fmt;
use std::result;
use std::io::Write;
use std::cell::{Cell, RefCell};

use term::{color, Terminal, StderrTerminal};
use whiley_env::{Source, SourceFile, Span, Pos};
use dummy_term::stderr_or_plain;

/// The severity of a report.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Kind {
    Note,
    Warn,
    Error,
    Fatal,
}

/// Signals that the current declaration or statement cannot be processed further.
///
/// `Stop` itself carries no payload; the actual diagnostic has already been
/// reported through a `Report` when a `Stop` is raised.
#[derive(Copy, Clone)]
pub struct Stop;

impl fmt::Debug for Stop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Stop")
    }
}

pub type Result<T> = result::Result<T, Stop>;

/// An endpoint for diagnostics.
pub trait Report {
    fn add_span(&self, kind: Kind, span: Span, msg: String) -> Result<()>;
}

impl<'a, R: Report + ?Sized> Report for &'a R {
    fn add_span(&self, k: Kind, s: Span, m: String) -> Result<()> { (**self).add_span(k, s, m) }
}

/// A convenience layer over `Report`.
pub trait Reporter: Report {
    fn fatal<Loc: Into<Span>, Msg: Into<String>, T>(&self, loc: Loc, msg: Msg) -> Result<T> {
        self.add_span(Kind::Fatal, loc.into(), msg.into())
            .map(|_| panic!("Report::fatal should always return Err"))
    }

    fn error<Loc: Into<Span>, Msg: Into<String>>(&self, loc: Loc, msg: Msg) -> Result<()> {
        self.add_span(Kind::Error, loc.into(), msg.into())
    }

    fn warn<Loc: Into<Span>, Msg: Into<String>>(&self, loc: Loc, msg: Msg) -> Result<()> {
        self.add_span(Kind::Warn, loc.into(), msg.into())
    }

    fn note<Loc: Into<Span>, Msg: Into<String>>(&self, loc: Loc, msg: Msg) -> Result<()> {
        self.add_span(Kind::Note, loc.into(), msg.into())
    }
}

impl<T: Report + ?Sized> Reporter for T {}

fn strip_newline(mut s: &str) -> &str {
    loop {
        match s.as_bytes().last() {
            Some(&b'\r') | Some(&b'\n') => { s = &s[..s.len() - 1]; }
            _ => return s,
        }
    }
}

// column number starts from 0; final newlines do not count towards columns.
// tabs are assumed to be 8 spaces wide as in the common terminals.
fn calculate_column(file: &SourceFile, linespan: Span, pos: Pos) -> usize {
    use unicode_width::UnicodeWidthChar;

    assert!(linespan.contains_or_end(pos));
    let off = pos.to_usize() - linespan.begin().to_usize();
    let line = strip_newline(file.slice_from_span(linespan).unwrap_or(""));

    let mut lastcol = 0;
    let mut col = 0;
    for (i, c) in line.char_indices() {
        if off < i { return lastcol; } // the last character was at (or contained) pos
        lastcol = col;
        if c == '\t' {
            col = (col + 8) & !7;
        } else {
            col += c.width_cjk().unwrap_or(1);
        }
    }
    // the else case is possible if pos points past the newlines
    if off < line.len() { lastcol } else { col }
}

/// A report endpoint that prints reports to stderr, colored if possible,
/// with a source excerpt whenever the span is known.
pub struct ConsoleReport<'a> {
    source: &'a Source,
    term: RefCell<Box<StderrTerminal>>,
}

impl<'a> ConsoleReport<'a> {
    pub fn new(source: &'a Source) -> ConsoleReport<'a> {
        ConsoleReport {
            source: source,
            term: RefCell::new(stderr_or_plain()),
        }
    }
}

impl<'a> Report for ConsoleReport<'a> {
    fn add_span(&self, kind: Kind, span: Span, msg: String) -> Result<()> {
        let mut term = self.term.borrow_mut();
        let term = &mut *term;

        let mut excerpt = None;
        if let Some(f) = self.source.file_from_span(span) {
            if let Some((beginline, beginspan)) = f.line_from_pos(span.begin()) {
                let (endline, endspan) = f.line_from_pos(span.end()).unwrap_or((beginline,
                                                                                beginspan));
                let begincol = calculate_column(f, beginspan, span.begin());
                let endcol = calculate_column(f, endspan, span.end());
                let _ = write!(term, "{}:{}:{}: ", f.path(), beginline + 1, begincol + 1);
                if span.begin() != span.end() {
                    let _ = write!(term, "{}:{} ", endline + 1, endcol + 1);
                }
                excerpt = Some((f, beginline, begincol, beginspan, endline, endcol, endspan));
            }
        }

        let (dim, bright, text) = match kind {
            Kind::Fatal => (color::RED, color::BRIGHT_RED, "Fatal"),
            Kind::Error => (color::RED, color::BRIGHT_RED, "Error"),
            Kind::Warn => (color::YELLOW, color::BRIGHT_YELLOW, "Warning"),
            Kind::Note => (color::CYAN, color::BRIGHT_CYAN, "Note"),
        };
        let _ = term.fg(dim);
        let _ = write!(term, "[");
        let _ = term.fg(bright);
        let _ = write!(term, "{}", text);
        let _ = term.fg(dim);
        let _ = write!(term, "] ");
        let _ = term.fg(color::BRIGHT_WHITE);
        let _ = write!(term, "{}", msg);
        let _ = term.reset();
        let _ = writeln!(term, "");

        // if possible, print the source code as well
        if let Some((f, beginline, begincol, beginspan, endline, endcol, endspan)) = excerpt {
            fn num_digits(mut x: usize) -> usize {
                let mut d = 1;
                while x > 9 { x /= 10; d += 1; }
                d
            }

            let ndigits = num_digits(endline + 1);

            if beginline == endline {
                // 123 | aaaabbbbbb     begincol = endcol
                //     |     *
                //
                // 123 | aaaaXXXXXbbb   begincol < endcol
                //     |     ^^^^^
                let line = strip_newline(f.slice_from_span(beginspan).unwrap_or(""));
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", beginline + 1, ndigits);
                let _ = term.reset();
                let _ = writeln!(term, "{}", line);
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", "", ndigits);
                let _ = term.fg(bright);
                if begincol == endcol {
                    let _ = write!(term, "{:1$}*", "", begincol);
                } else {
                    let _ = write!(term, "{:2$}{:^>3$}", "", "", begincol, endcol - begincol);
                }
                let _ = term.reset();
                let _ = writeln!(term, "");
            } else {
                // 123 | aaaaXXXXXXXX
                //     |     ^ from here...
                //     :
                // 321 | XXXXXbbbbb
                //     |     ^ to here
                let beginbytes = strip_newline(f.slice_from_span(beginspan).unwrap_or(""));
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", beginline + 1, ndigits);
                let _ = term.reset();
                let _ = writeln!(term, "{}", beginbytes);
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", "", ndigits);
                let _ = term.fg(bright);
                let _ = write!(term, "{:1$}^", "", begincol);
                let _ = term.fg(dim);
                let _ = write!(term, " from here...");
                let _ = term.reset();
                let _ = writeln!(term, "");

                if endline - beginline > 1 {
                    let _ = term.fg(color::BRIGHT_BLACK);
                    let _ = write!(term, "{:1$} :", "", ndigits);
                    let _ = term.reset();
                    let _ = writeln!(term, "");
                }

                let endbytes = strip_newline(f.slice_from_span(endspan).unwrap_or(""));
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", endline + 1, ndigits);
                let _ = term.reset();
                let _ = writeln!(term, "{}", endbytes);
                let _ = term.fg(color::BRIGHT_BLACK);
                let _ = write!(term, "{:1$} | ", "", ndigits);
                let _ = term.fg(bright);
                if endcol == 0 {
                    let _ = write!(term, "*");
                } else {
                    let _ = write!(term, "{:1$}^", "", endcol - 1);
                }
                let _ = term.fg(dim);
                let _ = write!(term, " ...to here");
                let _ = term.reset();
                let _ = writeln!(term, "");
            }
        }

        if kind == Kind::Fatal { Err(Stop) } else { Ok(()) }
    }
}

/// A report endpoint that records reports for later inspection, mainly for testing.
pub struct CollectedReport {
    collected: RefCell<Vec<(Kind, Span, String)>>,
}

impl CollectedReport {
    pub fn new() -> CollectedReport {
        CollectedReport { collected: RefCell::new(Vec::new()) }
    }

    pub fn reports(&self) -> Vec<(Kind, Span, String)> {
        self.collected.borrow().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.collected.borrow().iter().map(|&(_, _, ref m)| m.clone()).collect()
    }
}

impl Report for CollectedReport {
    fn add_span(&self, kind: Kind, span: Span, msg: String) -> Result<()> {
        self.collected.borrow_mut().push((kind, span, msg));
        if kind == Kind::Fatal { Err(Stop) } else { Ok(()) }
    }
}

/// A report endpoint that discards everything (except that fatal reports still stop).
pub struct NoReport;

impl Report for NoReport {
    fn add_span(&self, kind: Kind, _span: Span, _msg: String) -> Result<()> {
        if kind == Kind::Fatal { Err(Stop) } else { Ok(()) }
    }
}

/// Wraps another `Report`, remembering the worst kind seen so far.
pub struct TrackMaxKind<R> {
    report: R,
    maxkind: Cell<Option<Kind>>,
}

impl<R: Report> TrackMaxKind<R> {
    pub fn new(report: R) -> TrackMaxKind<R> {
        TrackMaxKind { report: report, maxkind: Cell::new(None) }
    }

    pub fn max_kind(&self) -> Option<Kind> {
        self.maxkind.get()
    }

    pub fn can_continue(&self) -> bool {
        self.maxkind.get() < Some(Kind::Fatal)
    }

    pub fn into_inner(self) -> R {
        self.report
    }
}

impl<R: Report> Report for TrackMaxKind<R> {
    fn add_span(&self, kind: Kind, span: Span, msg: String) -> Result<()> {
        if let Some(maxkind) = self.maxkind.get() {
            self.maxkind.set(Some(cmp::max(maxkind, kind)));
        } else {
            self.maxkind.set(Some(kind));
        }
        self.report.add_span(kind, span, msg)
    }
}

#[test]
fn test_collected_report() {
    use whiley_env::WithLoc;

    let report = TrackMaxKind::new(CollectedReport::new());
    assert!(report.can_continue());
    report.error(Span::dummy(), "oops".to_string()).unwrap();
    assert_eq!(report.max_kind(), Some(Kind::Error));
    assert!(report.can_continue());
    assert!(report.fatal::<_, _, ()>("stop".without_loc().span, "stop").is_err());
    assert_eq!(report.max_kind(), Some(Kind::Fatal));
    assert!(!report.can_continue());

    let collected = report.into_inner();
    assert_eq!(collected.messages(), vec!["oops".to_string(), "stop".to_string()]);
}
