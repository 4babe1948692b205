mod loc;
mod name;
mod source;

pub use loc::{Unit, Pos, Span, Spanned, WithLoc};
pub use name::{Name, ModuleId, NameId};
pub use source::{Source, SourceFile};
