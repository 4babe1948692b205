use std::io;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::collections::HashMap;
use std::collections::hash_map;

use loc::{self, Unit, Pos, Span};

/// A single source file with a lazily computed table of line starts.
pub struct SourceFile {
    path: String,
    data: String,
    unit: Unit,
    line_begins: Vec<u32>, // a byte offset of each line start, in the ascending order
}

impl SourceFile {
    pub fn from_file(path: &Path) -> io::Result<SourceFile> {
        let mut f = File::open(path)?;
        let mut data = String::new();
        f.read_to_string(&mut data)?;
        Ok(SourceFile::from_string(path.display().to_string(), data))
    }

    pub fn from_string(path: String, data: String) -> SourceFile {
        assert!(data.len() <= 0x7fffffff, "source file too long");
        let mut line_begins = vec![0];
        for (i, c) in data.char_indices() {
            if c == '\n' {
                line_begins.push((i + 1) as u32);
            }
        }
        SourceFile {
            path: path, data: data, unit: Unit::dummy(), line_begins: line_begins,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// A span covering the whole file. Dummy when the file is not added to a `Source` yet.
    pub fn span(&self) -> Span {
        Span::new(loc::pos_from_u32(self.unit, 0),
                  loc::pos_from_u32(self.unit, self.data.len() as u32))
    }

    fn line_begin(&self, line: usize) -> u32 {
        self.line_begins[line]
    }

    fn line_end(&self, line: usize) -> u32 {
        if line + 1 < self.line_begins.len() {
            self.line_begins[line + 1]
        } else {
            self.data.len() as u32
        }
    }

    /// Returns the zero-based line number and the span of that line (including any newline)
    /// for given position.
    pub fn line_from_pos(&self, pos: Pos) -> Option<(usize, Span)> {
        if pos.unit() != self.unit || pos.to_usize() > self.data.len() {
            return None;
        }
        let p = pos.to_usize() as u32;
        let line = match self.line_begins.binary_search(&p) {
            Ok(i) => i,
            Err(i) => i - 1, // i > 0 since line_begins[0] == 0
        };
        Some((line, self.line_span(line)))
    }

    /// Returns the span of given zero-based line.
    pub fn line_span(&self, line: usize) -> Span {
        Span::new(loc::pos_from_u32(self.unit, self.line_begin(line)),
                  loc::pos_from_u32(self.unit, self.line_end(line)))
    }

    /// Returns the source text for given span, which should be in range.
    pub fn slice_from_span(&self, span: Span) -> Option<&str> {
        if span.unit() != self.unit {
            return None;
        }
        self.data.get(span.begin().to_usize()..span.end().to_usize())
    }
}

/// A set of source files, each given a distinct `Unit`.
pub struct Source {
    files: HashMap<Unit, SourceFile>,
    next_unit: u32,
}

impl Source {
    pub fn new() -> Source {
        Source { files: HashMap::new(), next_unit: 1 }
    }

    /// Registers a file and returns its assigned unit.
    pub fn add(&mut self, mut file: SourceFile) -> Unit {
        let unit = loc::unit_from_u32(self.next_unit);
        self.next_unit += 1;
        file.unit = unit;
        self.files.insert(unit, file);
        unit
    }

    pub fn file(&self, unit: Unit) -> Option<&SourceFile> {
        self.files.get(&unit)
    }

    pub fn file_from_span(&self, span: Span) -> Option<&SourceFile> {
        if span.is_dummy() { return None; }
        self.files.get(&span.unit())
    }

    pub fn files(&self) -> hash_map::Values<Unit, SourceFile> {
        self.files.values()
    }
}

#[test]
fn test_line_lookup() {
    let mut source = Source::new();
    let unit = source.add(SourceFile::from_string("test.whiley".into(),
                                                  "define nat as int\n\nnat f(nat x):\n".into()));
    let f = source.file(unit).unwrap();

    let (line, span) = f.line_from_pos(f.span().begin()).unwrap();
    assert_eq!(line, 0);
    assert_eq!(f.slice_from_span(span), Some("define nat as int\n"));

    let (line, _) = f.line_from_pos(f.line_span(2).begin()).unwrap();
    assert_eq!(line, 2);
    assert_eq!(f.slice_from_span(f.line_span(2)), Some("nat f(nat x):\n"));
}
