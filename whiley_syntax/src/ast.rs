use whiley_env::{Name, ModuleId, NameId, Unit, Spanned};
use whiley_il::Value;

/// A binary operator at the source level.
///
/// The logical connectives never survive lowering as operations; they become
/// short-circuit branch shapes instead. The remainder maps onto IL `BinOp`s,
/// comparisons or set operations.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Range,
    /// Set union, `∪`.
    Union,
    /// Set intersection, `∩`.
    Intersection,
    /// Set difference, `\`.
    Difference,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Subset,
    SubsetEq,
    ElemOf,
    /// The runtime type test, `e is T`; the right operand is `Expr::TypeConst`.
    Is,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Shl,
    Shr,
}

/// A unary operator at the source level.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UOp {
    Neg,
    /// Bitwise inversion of a byte.
    Invert,
    Not,
    /// `|e|`, the length of a list or string.
    LengthOf,
    /// `*p`, reading the state of a process.
    ProcessAccess,
    /// `spawn e`, creating a process from an initial state.
    ProcessSpawn,
}

/// An n-ary operator at the source level.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NOp {
    /// `[e1, ..., en]`
    ListGen,
    /// `{e1, ..., en}`
    SetGen,
    /// `e[from..to]`, taking exactly three arguments.
    SubList,
}

/// The kind of a comprehension.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CompOp {
    /// `[e | x in xs, c]`, producing a list.
    List,
    /// `{e | x in xs, c}`, producing a set.
    Set,
    /// `some {x in xs | c}`, a boolean.
    Some,
    /// `none {x in xs | c}`, a boolean.
    None,
}

/// An expression.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    /// A literal, represented directly as an IL value.
    Constant(Value),

    /// A named local variable.
    LocalVariable(Name),

    /// An access to a named constant, local or foreign; the earlier naming
    /// pass has fully qualified it.
    ExternalAccess(NameId),

    BinOp(BOp, Box<Spanned<Expr>>, Box<Spanned<Expr>>),
    UnOp(UOp, Box<Spanned<Expr>>),
    NaryOp(NOp, Vec<Spanned<Expr>>),

    /// An explicit coercion, `(T) e`.
    Convert(Spanned<UnresolvedType>, Box<Spanned<Expr>>),

    /// `src[index]`.
    ListAccess(Box<Spanned<Expr>>, Box<Spanned<Expr>>),

    /// `lhs.name`.
    RecordAccess(Box<Spanned<Expr>>, Spanned<Name>),

    /// `{x: e1, y: e2}`, fields in source order.
    RecordGen(Vec<(Spanned<Name>, Spanned<Expr>)>),

    /// `(e1, ..., en)`.
    TupleGen(Vec<Spanned<Expr>>),

    /// `{k1->v1, ..., kn->vn}`.
    DictionaryGen(Vec<(Spanned<Expr>, Spanned<Expr>)>),

    /// A list or set comprehension, or a quantified boolean.
    Comprehension {
        op: CompOp,
        /// The element expression; absent for the quantified forms.
        value: Option<Box<Spanned<Expr>>>,
        /// `(variable, source collection)` pairs, iterated leftmost-outermost.
        sources: Vec<(Spanned<Name>, Spanned<Expr>)>,
        condition: Option<Box<Spanned<Expr>>>,
    },

    /// A function, method or message invocation.
    Invoke {
        name: Spanned<Name>,
        receiver: Option<Box<Spanned<Expr>>>,
        arguments: Vec<Spanned<Expr>>,
        /// For message sends, whether the sender waits for the result.
        synchronous: bool,
        /// The module a matching symbol was resolved in, if any.
        module: Option<ModuleId>,
    },

    /// A reference to a named function, `&f` or `&f(int, int)`.
    Function {
        name: Spanned<Name>,
        parameter_types: Option<Vec<Spanned<UnresolvedType>>>,
        module: Option<ModuleId>,
    },

    /// The right operand of an `is` test.
    TypeConst(Spanned<UnresolvedType>),
}

/// A statement.
#[derive(Clone, PartialEq, Debug)]
pub enum Stmt {
    /// `lhs = rhs`, where `lhs` is a variable, a tuple of variables, or a
    /// chain of list/record accesses rooted at a variable.
    Assign(Spanned<Expr>, Spanned<Expr>),

    Assert(Spanned<Expr>),

    Return(Option<Spanned<Expr>>),

    /// Prints a value for debugging; kept distinct from invocations since the
    /// backend wires it specially.
    Debug(Spanned<Expr>),

    Skip,

    IfElse {
        condition: Spanned<Expr>,
        true_branch: Vec<Spanned<Stmt>>,
        false_branch: Vec<Spanned<Stmt>>,
    },

    Switch {
        expr: Spanned<Expr>,
        cases: Vec<Spanned<Case>>,
    },

    TryCatch {
        body: Vec<Spanned<Stmt>>,
        catches: Vec<Catch>,
    },

    Break,
    Continue,

    Throw(Spanned<Expr>),

    While {
        condition: Spanned<Expr>,
        invariant: Option<Spanned<Expr>>,
        body: Vec<Spanned<Stmt>>,
    },

    DoWhile {
        condition: Spanned<Expr>,
        invariant: Option<Spanned<Expr>>,
        body: Vec<Spanned<Stmt>>,
    },

    For {
        /// More than one variable destructures the element.
        variables: Vec<Spanned<Name>>,
        source: Spanned<Expr>,
        invariant: Option<Spanned<Expr>>,
        body: Vec<Spanned<Stmt>>,
    },

    /// An invocation or spawn in statement position.
    ExprStmt(Spanned<Expr>),
}

/// One arm of a switch; no values means the default arm.
#[derive(Clone, PartialEq, Debug)]
pub struct Case {
    pub values: Vec<Spanned<Expr>>,
    pub body: Vec<Spanned<Stmt>>,
}

/// One handler of a try/catch.
#[derive(Clone, PartialEq, Debug)]
pub struct Catch {
    pub ty: Spanned<UnresolvedType>,
    pub variable: Spanned<Name>,
    pub body: Vec<Spanned<Stmt>>,
}

/// A type as written in the source, before named types are expanded to their
/// structural form.
#[derive(Clone, PartialEq, Debug)]
pub enum UnresolvedType {
    Any,
    Void,
    Null,
    Bool,
    Byte,
    Char,
    Int,
    Real,
    Strung,
    List(Box<Spanned<UnresolvedType>>),
    Set(Box<Spanned<UnresolvedType>>),
    Dictionary(Box<Spanned<UnresolvedType>>, Box<Spanned<UnresolvedType>>),
    Tuple(Vec<Spanned<UnresolvedType>>),
    Record {
        open: bool,
        fields: Vec<(Spanned<Name>, Spanned<UnresolvedType>)>,
    },
    Union(Vec<Spanned<UnresolvedType>>),
    Not(Box<Spanned<UnresolvedType>>),
    Intersection(Vec<Spanned<UnresolvedType>>),
    Process(Box<Spanned<UnresolvedType>>),
    /// A reference to a named type, fully qualified by the naming pass.
    Named(NameId),
}

/// A top-level declaration.
#[derive(Clone, PartialEq, Debug)]
pub enum Decl {
    Type(TypeDecl),
    Constant(ConstDecl),
    Function(FunDecl),
}

/// `define name as T where c`.
#[derive(Clone, PartialEq, Debug)]
pub struct TypeDecl {
    pub name: Spanned<Name>,
    pub ty: Spanned<UnresolvedType>,
    /// The `where` predicate over `$`, if any.
    pub constraint: Option<Spanned<Expr>>,
}

/// `define name as e`.
#[derive(Clone, PartialEq, Debug)]
pub struct ConstDecl {
    pub name: Spanned<Name>,
    pub expr: Spanned<Expr>,
}

/// A function or method declaration; a method carries a receiver type.
#[derive(Clone, PartialEq, Debug)]
pub struct FunDecl {
    pub name: Spanned<Name>,
    pub receiver: Option<Spanned<UnresolvedType>>,
    pub parameters: Vec<Parameter>,
    pub ret: Spanned<UnresolvedType>,
    /// The `requires` condition, if any.
    pub precondition: Option<Spanned<Expr>>,
    /// The `ensures` condition over `$` and the original parameters, if any.
    pub postcondition: Option<Spanned<Expr>>,
    pub body: Vec<Spanned<Stmt>>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Parameter {
    pub ty: Spanned<UnresolvedType>,
    pub name: Spanned<Name>,
}

/// One parsed source file.
#[derive(Clone, Debug)]
pub struct WhileyFile {
    pub module: ModuleId,
    /// The source unit this file was registered under.
    pub unit: Unit,
    pub declarations: Vec<Spanned<Decl>>,
}

impl FunDecl {
    pub fn is_method(&self) -> bool {
        self.receiver.is_some()
    }
}
