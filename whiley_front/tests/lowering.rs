//! End-to-end tests: build little programs as ASTs, resolve and lower them,
//! and run the resulting blocks through the reference evaluator in `support`.

extern crate num_bigint;
extern crate num_rational;
extern crate num_traits;
extern crate whiley_env;
extern crate whiley_diag;
extern crate whiley_types;
extern crate whiley_il;
extern crate whiley_syntax;
extern crate whiley_front;

mod support;

use std::collections::BTreeMap;

use whiley_env::{Name, ModuleId, NameId, Spanned, WithLoc};
use whiley_diag::CollectedReport;
use whiley_types::{is_subtype, Type, T_INT};
use whiley_il::{Code, Value, Module};
use whiley_syntax::{WhileyFile, Decl, TypeDecl, ConstDecl, FunDecl, Parameter};
use whiley_syntax::{Stmt, Case, Expr, UnresolvedType, BOp, CompOp};
use whiley_front::{Resolver, NoModules};

// ---------------------------------------------------------------------------
// little builders for the ASTs the parser would otherwise produce

fn test_module() -> ModuleId {
    ModuleId::from_path("test")
}

fn nid(name: &str) -> NameId {
    NameId::new(test_module(), name)
}

fn n(name: &str) -> Spanned<Name> {
    Name::from(name).without_loc()
}

fn con(v: Value) -> Spanned<Expr> {
    Expr::Constant(v).without_loc()
}

fn int(i: i64) -> Spanned<Expr> {
    con(Value::int(i))
}

fn var(name: &str) -> Spanned<Expr> {
    Expr::LocalVariable(name.into()).without_loc()
}

fn bx(e: Spanned<Expr>) -> Box<Spanned<Expr>> {
    Box::new(e)
}

fn binop(op: BOp, lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Expr> {
    Expr::BinOp(op, bx(lhs), bx(rhs)).without_loc()
}

fn ut(t: UnresolvedType) -> Spanned<UnresolvedType> {
    t.without_loc()
}

fn named(name: &str) -> Spanned<UnresolvedType> {
    ut(UnresolvedType::Named(nid(name)))
}

fn record_type(fields: Vec<(&str, UnresolvedType)>) -> Spanned<UnresolvedType> {
    ut(UnresolvedType::Record {
        open: false,
        fields: fields.into_iter().map(|(name, t)| (n(name), ut(t))).collect(),
    })
}

fn is_type(e: Spanned<Expr>, t: UnresolvedType) -> Spanned<Expr> {
    binop(BOp::Is, e, Expr::TypeConst(ut(t)).without_loc())
}

fn field(e: Spanned<Expr>, name: &str) -> Spanned<Expr> {
    Expr::RecordAccess(bx(e), n(name)).without_loc()
}

fn ret(e: Spanned<Expr>) -> Spanned<Stmt> {
    Stmt::Return(Some(e)).without_loc()
}

fn assign(lhs: Spanned<Expr>, rhs: Spanned<Expr>) -> Spanned<Stmt> {
    Stmt::Assign(lhs, rhs).without_loc()
}

fn type_decl(name: &str, ty: Spanned<UnresolvedType>,
             constraint: Option<Spanned<Expr>>) -> Spanned<Decl> {
    Decl::Type(TypeDecl { name: n(name), ty: ty, constraint: constraint }).without_loc()
}

fn const_decl(name: &str, expr: Spanned<Expr>) -> Spanned<Decl> {
    Decl::Constant(ConstDecl { name: n(name), expr: expr }).without_loc()
}

fn fun_decl(name: &str, params: Vec<(Spanned<UnresolvedType>, &str)>,
            ret_ty: Spanned<UnresolvedType>, body: Vec<Spanned<Stmt>>) -> Spanned<Decl> {
    Decl::Function(FunDecl {
        name: n(name),
        receiver: None,
        parameters: params.into_iter()
                          .map(|(ty, pname)| Parameter { ty: ty, name: n(pname) })
                          .collect(),
        ret: ret_ty,
        precondition: None,
        postcondition: None,
        body: body,
    }).without_loc()
}

fn file(decls: Vec<Spanned<Decl>>) -> WhileyFile {
    WhileyFile {
        module: test_module(),
        unit: whiley_env::Unit::dummy(),
        declarations: decls,
    }
}

fn resolve(files: Vec<WhileyFile>) -> (Vec<Module>, Vec<String>) {
    let loader = NoModules;
    let report = CollectedReport::new();
    let modules = {
        let mut resolver = Resolver::new(&loader, &report);
        resolver.run(&files).expect("internal failure during resolution")
    };
    (modules, report.messages())
}

fn record_value(fields: Vec<(&str, Value)>) -> Value {
    let mut map = BTreeMap::new();
    for (name, v) in fields {
        map.insert(name.into(), v);
    }
    Value::Record(map)
}

// ---------------------------------------------------------------------------
// the scenarios

#[test]
fn nat_constraint_guards_calls() {
    // define nat as int where $ >= 0
    // nat f(nat x): return x
    let (modules, messages) = resolve(vec![file(vec![
        type_decl("nat", ut(UnresolvedType::Int),
                  Some(binop(BOp::GtEq, var("$"), int(0)))),
        fun_decl("f", vec![(named("nat"), "x")], named("nat"),
                 vec![ret(var("x"))]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    let td = module.type_decl(&"nat".into()).unwrap();
    assert_eq!(td.ty, T_INT);
    assert!(td.constraint.is_some());

    let f = module.function(&"f".into()).unwrap();
    assert!(f.precondition.is_some());
    assert!(f.postcondition.is_some());

    assert_eq!(support::call(module, "f", vec![Value::int(3)]), Ok(Value::int(3)));
    let err = support::call(module, "f", vec![Value::int(-1)]).unwrap_err();
    assert!(err.contains("constraint on type not satisfied"), "unexpected error: {}", err);
}

#[test]
fn set_constant_doubles_as_membership_type() {
    // define primes as {2, 3, 5}
    // int f(primes x): return x
    let (modules, messages) = resolve(vec![file(vec![
        const_decl("primes", con(Value::Set(vec![Value::int(2), Value::int(3),
                                                 Value::int(5)].into_iter().collect()))),
        fun_decl("f", vec![(named("primes"), "x")], ut(UnresolvedType::Int),
                 vec![ret(var("x"))]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    assert!(module.constant(&"primes".into()).is_some());
    assert_eq!(support::call(module, "f", vec![Value::int(3)]), Ok(Value::int(3)));
    let err = support::call(module, "f", vec![Value::int(4)]).unwrap_err();
    assert!(err.contains("constraint on type not satisfied"), "unexpected error: {}", err);
}

#[test]
fn union_of_records_expands_structurally() {
    // define Point2D as {int x, int y}
    // define Point3D as {int x, int y, int z}
    // define Point as Point2D | Point3D
    let (modules, messages) = resolve(vec![file(vec![
        type_decl("Point2D",
                  record_type(vec![("x", UnresolvedType::Int), ("y", UnresolvedType::Int)]),
                  None),
        type_decl("Point3D",
                  record_type(vec![("x", UnresolvedType::Int), ("y", UnresolvedType::Int),
                                   ("z", UnresolvedType::Int)]),
                  None),
        type_decl("Point",
                  ut(UnresolvedType::Union(vec![named("Point2D").base.without_loc(),
                                                named("Point3D").base.without_loc()])),
                  None),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    let point = &module.type_decl(&"Point".into()).unwrap().ty;
    assert_eq!(format!("{}", point), "{int x,int y}|{int x,int y,int z}");

    let p2 = record_value(vec![("x", Value::int(1)), ("y", Value::int(2))]);
    assert!(is_subtype(point, &p2.ty()));
    assert!(support::instance_of(&p2, point));

    let p1 = record_value(vec![("x", Value::int(1))]);
    assert!(!is_subtype(point, &p1.ty()));
    assert!(!support::instance_of(&p1, point));
}

#[test]
fn recursive_list_sums() {
    // define LList as null | {int data, LList next}
    // int sum(LList l):
    //     if l is null:
    //         return 0
    //     else:
    //         return l.data + sum(l.next)
    let invoke_sum = Expr::Invoke {
        name: n("sum"),
        receiver: None,
        arguments: vec![field(var("l"), "next")],
        synchronous: false,
        module: Some(test_module()),
    }.without_loc();

    let (modules, messages) = resolve(vec![file(vec![
        type_decl("LList",
                  ut(UnresolvedType::Union(vec![
                      ut(UnresolvedType::Null),
                      record_type(vec![("data", UnresolvedType::Int),
                                       ("next", UnresolvedType::Named(nid("LList")))]).base
                          .without_loc(),
                  ])),
                  None),
        fun_decl("sum", vec![(named("LList"), "l")], ut(UnresolvedType::Int), vec![
            Stmt::IfElse {
                condition: is_type(var("l"), UnresolvedType::Null),
                true_branch: vec![ret(int(0))],
                false_branch: vec![ret(binop(BOp::Add, field(var("l"), "data"), invoke_sum))],
            }.without_loc(),
        ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    // the expanded type ties the knot through its own `next` field
    let llist = &module.type_decl(&"LList".into()).unwrap().ty;
    assert_eq!(format!("{}", llist), "X<null|{int data,X next}>");
    let rec = llist.bounds().unwrap().into_iter().find(|b| b.fields().is_some()).unwrap();
    assert_eq!(rec.field(&"next".into()).unwrap(), *llist);

    let list = record_value(vec![
        ("data", Value::int(2)),
        ("next", record_value(vec![("data", Value::int(1)), ("next", Value::Null)])),
    ]);
    assert_eq!(support::call(module, "sum", vec![list]), Ok(Value::int(3)));
    assert_eq!(support::call(module, "sum", vec![Value::Null]), Ok(Value::int(0)));
}

#[test]
fn tuple_destructuring_assignment() {
    // int f(): x, y = (1, 2); return x + 10 * y
    let lhs = Expr::TupleGen(vec![var("x"), var("y")]).without_loc();
    let rhs = Expr::TupleGen(vec![int(1), int(2)]).without_loc();
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![], ut(UnresolvedType::Int), vec![
            assign(lhs, rhs),
            ret(binop(BOp::Add, var("x"), binop(BOp::Mul, int(10), var("y")))),
        ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    assert_eq!(support::call(&modules[0], "f", vec![]), Ok(Value::int(21)));
}

#[test]
fn nested_assignments_update_in_place() {
    // int f({int x, int y} p): p.x = 5; return p.x
    // int g([int] l): l[1] = 9; return l[1]
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f",
                 vec![(record_type(vec![("x", UnresolvedType::Int),
                                        ("y", UnresolvedType::Int)]), "p")],
                 ut(UnresolvedType::Int),
                 vec![
                     assign(field(var("p"), "x"), int(5)),
                     ret(field(var("p"), "x")),
                 ]),
        fun_decl("g",
                 vec![(ut(UnresolvedType::List(Box::new(ut(UnresolvedType::Int)))), "l")],
                 ut(UnresolvedType::Int),
                 vec![
                     assign(Expr::ListAccess(bx(var("l")), bx(int(1))).without_loc(), int(9)),
                     ret(Expr::ListAccess(bx(var("l")), bx(int(1))).without_loc()),
                 ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    let p = record_value(vec![("x", Value::int(1)), ("y", Value::int(2))]);
    assert_eq!(support::call(module, "f", vec![p]), Ok(Value::int(5)));

    let l = Value::List(vec![Value::int(7), Value::int(8), Value::int(3)]);
    assert_eq!(support::call(module, "g", vec![l]), Ok(Value::int(9)));
}

#[test]
fn switch_dispatches_and_rejects_duplicates() {
    let switch = |cases: Vec<Case>| {
        vec![Stmt::Switch {
            expr: var("x"),
            cases: cases.into_iter().map(|c| c.without_loc()).collect(),
        }.without_loc(), ret(int(0))]
    };

    // a working three-way dispatch
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Int), "x")], ut(UnresolvedType::Int),
                 switch(vec![
                     Case { values: vec![int(1)], body: vec![ret(int(10))] },
                     Case { values: vec![int(2)], body: vec![ret(int(20))] },
                     Case { values: vec![], body: vec![ret(int(0))] },
                 ])),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    assert_eq!(support::call(&modules[0], "f", vec![Value::int(2)]), Ok(Value::int(20)));
    assert_eq!(support::call(&modules[0], "f", vec![Value::int(9)]), Ok(Value::int(0)));

    // a duplicated case label
    let (_, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Int), "x")], ut(UnresolvedType::Int),
                 switch(vec![
                     Case { values: vec![int(1)], body: vec![ret(int(10))] },
                     Case { values: vec![int(1)], body: vec![ret(int(20))] },
                 ])),
    ])]);
    assert!(messages.iter().any(|e| e.contains("duplicate case label")), "{:?}", messages);

    // a duplicated default
    let (_, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Int), "x")], ut(UnresolvedType::Int),
                 switch(vec![
                     Case { values: vec![], body: vec![ret(int(1))] },
                     Case { values: vec![], body: vec![ret(int(2))] },
                 ])),
    ])]);
    assert!(messages.iter().any(|e| e.contains("duplicate default label")), "{:?}", messages);
}

#[test]
fn while_loop_sums_downwards() {
    // int f(int n): r = 0; while n > 0: r = r + n; n = n - 1; return r
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Int), "n")], ut(UnresolvedType::Int), vec![
            assign(var("r"), int(0)),
            Stmt::While {
                condition: binop(BOp::Gt, var("n"), int(0)),
                invariant: None,
                body: vec![
                    assign(var("r"), binop(BOp::Add, var("r"), var("n"))),
                    assign(var("n"), binop(BOp::Sub, var("n"), int(1))),
                ],
            }.without_loc(),
            ret(var("r")),
        ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    assert_eq!(support::call(&modules[0], "f", vec![Value::int(3)]), Ok(Value::int(6)));
    assert_eq!(support::call(&modules[0], "f", vec![Value::int(0)]), Ok(Value::int(0)));
}

#[test]
fn break_leaves_the_innermost_loop() {
    // int f(int n): while true: n = n + 1; if n > 41: break
    //               return n
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Int), "n")], ut(UnresolvedType::Int), vec![
            Stmt::While {
                condition: con(Value::Bool(true)),
                invariant: None,
                body: vec![
                    assign(var("n"), binop(BOp::Add, var("n"), int(1))),
                    Stmt::IfElse {
                        condition: binop(BOp::Gt, var("n"), int(41)),
                        true_branch: vec![Stmt::Break.without_loc()],
                        false_branch: vec![],
                    }.without_loc(),
                ],
            }.without_loc(),
            ret(var("n")),
        ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    assert_eq!(support::call(&modules[0], "f", vec![Value::int(0)]), Ok(Value::int(42)));

    // a break with no enclosing loop is an error
    let (_, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![], ut(UnresolvedType::Int),
                 vec![Stmt::Break.without_loc(), ret(int(0))]),
    ])]);
    assert!(messages.iter().any(|e| e.contains("break outside")), "{:?}", messages);
}

#[test]
fn cyclic_constants_are_reported() {
    // define A as B + 1
    // define B as A + 1
    let (_, messages) = resolve(vec![file(vec![
        const_decl("A", binop(BOp::Add, Expr::ExternalAccess(nid("B")).without_loc(), int(1))),
        const_decl("B", binop(BOp::Add, Expr::ExternalAccess(nid("A")).without_loc(), int(1))),
    ])]);
    assert!(messages.iter().any(|e| e.contains("cyclic constant declaration")),
            "{:?}", messages);
}

#[test]
fn unguarded_cyclic_type_is_reported() {
    // define X as X
    let (_, messages) = resolve(vec![file(vec![
        type_decl("X", named("X"), None),
    ])]);
    assert!(messages.iter().any(|e| e.contains("cyclic type declaration")), "{:?}", messages);

    // a recursion behind a record constructor is fine
    let (modules, messages) = resolve(vec![file(vec![
        type_decl("Y",
                  ut(UnresolvedType::Union(vec![
                      ut(UnresolvedType::Null),
                      record_type(vec![("next", UnresolvedType::Named(nid("Y")))]).base
                          .without_loc(),
                  ])),
                  None),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    assert!(modules[0].type_decl(&"Y".into()).is_some());
}

#[test]
fn type_tests_lower_to_iftype() {
    // int f(any x): if x is [int]: return 1
    //               return 0
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(ut(UnresolvedType::Any), "x")], ut(UnresolvedType::Int), vec![
            Stmt::IfElse {
                condition: is_type(var("x"),
                                   UnresolvedType::List(Box::new(ut(UnresolvedType::Int)))),
                true_branch: vec![ret(int(1))],
                false_branch: vec![],
            }.without_loc(),
            ret(int(0)),
        ]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    // the test appears as a single IfType over the expected structural type
    let f = module.function(&"f".into()).unwrap();
    let int_list = Type::list(T_INT);
    assert!(f.body.entries().iter().any(|e| match e.code {
        Code::IfType { ref ty, .. } => *ty == int_list,
        _ => false,
    }));

    let ints = Value::List(vec![Value::int(1), Value::int(2)]);
    assert_eq!(support::call(module, "f", vec![ints]), Ok(Value::int(1)));
    let mixed = Value::List(vec![Value::int(1), Value::Null]);
    assert_eq!(support::call(module, "f", vec![mixed]), Ok(Value::int(0)));
    assert_eq!(support::call(module, "f", vec![Value::Null]), Ok(Value::int(0)));
}

#[test]
fn constants_fold_into_loads() {
    // define N as 2 + 3
    // int f(): return N
    let (modules, messages) = resolve(vec![file(vec![
        const_decl("N", binop(BOp::Add, int(2), int(3))),
        fun_decl("f", vec![], ut(UnresolvedType::Int),
                 vec![ret(Expr::ExternalAccess(nid("N")).without_loc())]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];
    assert_eq!(module.constant(&"N".into()).unwrap().value, Value::int(5));
    assert_eq!(support::call(module, "f", vec![]), Ok(Value::int(5)));
}

#[test]
fn comprehensions_accumulate() {
    // [int] f([int] xs): return [x * 2 | x in xs]
    let comp = Expr::Comprehension {
        op: CompOp::List,
        value: Some(bx(binop(BOp::Mul, var("x"), int(2)))),
        sources: vec![(n("x"), var("xs"))],
        condition: None,
    }.without_loc();
    // bool g([int] xs): return some {x in xs | x > 2}
    let quant = Expr::Comprehension {
        op: CompOp::Some,
        value: None,
        sources: vec![(n("x"), var("xs"))],
        condition: Some(bx(binop(BOp::Gt, var("x"), int(2)))),
    }.without_loc();

    let int_list = || ut(UnresolvedType::List(Box::new(ut(UnresolvedType::Int))));
    let (modules, messages) = resolve(vec![file(vec![
        fun_decl("f", vec![(int_list(), "xs")], int_list(), vec![ret(comp)]),
        fun_decl("g", vec![(int_list(), "xs")], ut(UnresolvedType::Bool), vec![ret(quant)]),
    ])]);
    assert_eq!(messages, Vec::<String>::new());
    let module = &modules[0];

    let xs = Value::List(vec![Value::int(1), Value::int(2), Value::int(3)]);
    assert_eq!(support::call(module, "f", vec![xs.clone()]),
               Ok(Value::List(vec![Value::int(2), Value::int(4), Value::int(6)])));
    assert_eq!(support::call(module, "g", vec![xs]), Ok(Value::Bool(true)));
    let small = Value::List(vec![Value::int(1)]);
    assert_eq!(support::call(module, "g", vec![small]), Ok(Value::Bool(false)));
}
