use whiley_env::{Name, NameId};
use whiley_types::Type;
use value::Value;

/// Branch labels are plain strings; `block::fresh_label` generates unique ones.
pub type Label = String;

/// A binary arithmetic or bitwise operation. `And`, `Or` and `Xor` are the
/// bitwise forms; logical connectives never reach here since conditions are
/// lowered into short-circuit branches instead.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Range,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// A comparison used by `IfGoto`.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum COp {
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    ElemOf,
    Subset,
    SubsetEq,
}

/// Which operand of a set operation is already a set; the other ones are
/// elements to be lifted.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OpDir {
    Uniform,
    Left,
    Right,
}

/// A single IL operation.
///
/// Operations work over an operand stack plus numbered local slots. Types
/// attached to operations reflect what the lowerer knew at translation time;
/// a later inference stage tightens them.
#[derive(Clone, PartialEq, Debug)]
pub enum Code {
    // data motion
    Load(usize),
    Store(usize),
    Const(Value),
    Convert(Type),
    /// Explodes a tuple on the stack into its components.
    Destructure,

    BinOp(BOp),

    // aggregates
    NewList(usize),
    NewSet(usize),
    NewTuple(usize),
    NewDict(usize),
    NewRecord(Type),
    ListLoad,
    ListLength,
    SubList,
    FieldLoad(Name),
    TupleLoad(usize),
    SetUnion(OpDir),
    SetIntersect(OpDir),

    /// Assigns the top of the stack into a nested sub-location of a slot.
    /// The walk is `depth` levels deep; record levels take the next name off
    /// `fields` while list and dictionary levels consume an evaluated key
    /// from the stack.
    Update { slot: usize, depth: usize, fields: Vec<Name> },

    // control flow
    Label(Label),
    Goto(Label),
    IfGoto(COp, Label),
    /// Branches when the slot (or the top of the stack, when `slot` is
    /// absent) holds a value of the given type.
    IfType { slot: Option<usize>, ty: Type, target: Label },
    Switch { default: Label, cases: Vec<(Value, Label)> },
    ForAll { slot: usize, end: Label, modified: Vec<usize> },
    Loop { end: Label, modified: Vec<usize> },
    End(Label),
    Assert(Label),
    Fail(String),
    Skip,
    Debug,

    // invocation
    Invoke { name: NameId, ty: Type, retval: bool },
    IndirectInvoke { ty: Type, retval: bool },
    Send { name: NameId, ty: Type, synchronous: bool, retval: bool },
    IndirectSend { ty: Type, synchronous: bool, retval: bool },
    Throw,
    TryCatch { end: Label, catches: Vec<(Type, Label)> },
    Return(Type),

    // references and processes
    Spawn,
    ProcLoad,
}

impl Code {
    /// Rewrites every slot number mentioned by this operation.
    pub fn remap_slots<F: FnMut(usize) -> usize>(&self, mut f: F) -> Code {
        match *self {
            Code::Load(s) => Code::Load(f(s)),
            Code::Store(s) => Code::Store(f(s)),
            Code::Update { slot, depth, ref fields } => {
                Code::Update { slot: f(slot), depth: depth, fields: fields.clone() }
            }
            Code::IfType { slot, ref ty, ref target } => {
                Code::IfType { slot: slot.map(&mut f), ty: ty.clone(), target: target.clone() }
            }
            Code::ForAll { slot, ref end, ref modified } => {
                Code::ForAll {
                    slot: f(slot),
                    end: end.clone(),
                    modified: modified.iter().map(|&s| f(s)).collect(),
                }
            }
            Code::Loop { ref end, ref modified } => {
                Code::Loop {
                    end: end.clone(),
                    modified: modified.iter().map(|&s| f(s)).collect(),
                }
            }
            ref code => code.clone(),
        }
    }

    /// Rewrites every label mentioned by this operation.
    pub fn map_labels<F: FnMut(&Label) -> Label>(&self, mut f: F) -> Code {
        match *self {
            Code::Label(ref l) => Code::Label(f(l)),
            Code::Goto(ref l) => Code::Goto(f(l)),
            Code::IfGoto(cop, ref l) => Code::IfGoto(cop, f(l)),
            Code::IfType { slot, ref ty, ref target } => {
                Code::IfType { slot: slot, ty: ty.clone(), target: f(target) }
            }
            Code::Switch { ref default, ref cases } => {
                Code::Switch {
                    default: f(default),
                    cases: cases.iter().map(|&(ref v, ref l)| (v.clone(), f(l))).collect(),
                }
            }
            Code::ForAll { slot, ref end, ref modified } => {
                Code::ForAll { slot: slot, end: f(end), modified: modified.clone() }
            }
            Code::Loop { ref end, ref modified } => {
                Code::Loop { end: f(end), modified: modified.clone() }
            }
            Code::End(ref l) => Code::End(f(l)),
            Code::Assert(ref l) => Code::Assert(f(l)),
            Code::TryCatch { ref end, ref catches } => {
                Code::TryCatch {
                    end: f(end),
                    catches: catches.iter().map(|&(ref t, ref l)| (t.clone(), f(l))).collect(),
                }
            }
            ref code => code.clone(),
        }
    }

    /// The label this operation *defines*, i.e. the point a branch can land on.
    /// `End` both closes a loop and defines its label for forward branches.
    pub fn defined_label(&self) -> Option<&Label> {
        match *self {
            Code::Label(ref l) | Code::End(ref l) => Some(l),
            _ => None,
        }
    }

    /// Every label this operation branches to.
    pub fn target_labels(&self) -> Vec<&Label> {
        match *self {
            Code::Goto(ref l) | Code::IfGoto(_, ref l) | Code::Assert(ref l) => vec![l],
            Code::IfType { ref target, .. } => vec![target],
            Code::Switch { ref default, ref cases } => {
                let mut ls = vec![default];
                ls.extend(cases.iter().map(|&(_, ref l)| l));
                ls
            }
            Code::ForAll { ref end, .. } | Code::Loop { ref end, .. } => vec![end],
            Code::TryCatch { ref end, ref catches } => {
                let mut ls = vec![end];
                ls.extend(catches.iter().map(|&(_, ref l)| l));
                ls
            }
            _ => vec![],
        }
    }
}
