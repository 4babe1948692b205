use std::fmt;
use std::ops;

/// An identifier occurring in source programs: a variable, field, label or module segment.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    name: Box<str>,
}

impl Name {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl<'a> From<&'a str> for Name {
    fn from(s: &'a str) -> Name { Name { name: s.into() } }
}

impl From<String> for Name {
    fn from(s: String) -> Name { Name { name: s.into_boxed_str() } }
}

impl ops::Deref for Name {
    type Target = str;
    fn deref(&self) -> &str { &self.name }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self.name, f)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "`{}`", self.name)
    }
}

/// A fully qualified module identifier: zero or more package segments plus the module name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId {
    pub pkg: Vec<Name>,
    pub name: Name,
}

impl ModuleId {
    pub fn new<N: Into<Name>>(pkg: Vec<Name>, name: N) -> ModuleId {
        ModuleId { pkg: pkg, name: name.into() }
    }

    /// Parses a dotted path like `whiley.lang.Math`; the last segment is the module name.
    pub fn from_path(path: &str) -> ModuleId {
        let mut segs: Vec<Name> = path.split('.').map(|s| s.into()).collect();
        let name = segs.pop().expect("empty module path");
        ModuleId { pkg: segs, name: name }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for p in &self.pkg {
            write!(f, "{}.", p)?;
        }
        write!(f, "{}", self.name)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A fully qualified name of a declaration, i.e. a module identifier plus a local name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameId {
    pub module: ModuleId,
    pub name: Name,
}

impl NameId {
    pub fn new<N: Into<Name>>(module: ModuleId, name: N) -> NameId {
        NameId { module: module, name: name.into() }
    }
}

impl fmt::Display for NameId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

impl fmt::Debug for NameId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[test]
fn test_name_id_display() {
    let mid = ModuleId::from_path("whiley.lang.Math");
    assert_eq!(format!("{}", mid), "whiley.lang.Math");
    let nid = NameId::new(mid, "max");
    assert_eq!(format!("{}", nid), "whiley.lang.Math:max");
}
