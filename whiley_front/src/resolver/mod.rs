use std::cell::Cell;
use std::collections::{HashMap, HashSet};

use vec_map::VecMap;
use whiley_env::{Name, NameId, ModuleId, Span, Spanned, Unit};
use whiley_diag::{Report, Reporter, Result, Stop};
use whiley_types::{Type, T_VOID};
use whiley_il::{self, Block, Code, COp, Label, Value, Module, fresh_label, THIS_SLOT};
use whiley_syntax::{WhileyFile, Decl, FunDecl, Expr, UnresolvedType};
use loader::ModuleLoader;
use message as m;

mod eval;
mod expand;
mod lower;

// the enclosing loop (or switch) a break or continue statement targets
struct LoopScope {
    break_label: Label,
    continue_label: Option<Label>,
}

// per-function state; only what the statement lowering needs to look back at
struct CurrentFn {
    ret: Type,
}

/// Resolves and lowers a group of parsed source files.
///
/// All mutable state of a run lives here, so unrelated compilations can
/// proceed in parallel by giving each its own resolver. The resolver reports
/// at most one error per declaration (and one per statement inside function
/// bodies); reported declarations are skipped and everything else continues.
pub struct Resolver<'a> {
    loader: &'a ModuleLoader,
    report: &'a Report,

    /// The modules being compiled in this run; anything else goes through
    /// the loader.
    modules: HashSet<ModuleId>,
    /// Which unit each declaration came from.
    filemap: HashMap<NameId, Unit>,
    /// Fully expanded named types with their constraint blocks.
    types: HashMap<NameId, (Type, Option<Block>)>,
    /// Fully evaluated constants.
    constants: HashMap<NameId, Value>,
    /// Type declarations not yet expanded.
    unresolved: HashMap<NameId, (Spanned<UnresolvedType>, Option<Spanned<Expr>>)>,
    /// Constant declarations by name, for the evaluator.
    const_exprs: HashMap<NameId, Spanned<Expr>>,
    /// Spans of the declarations themselves, for reporting.
    decl_spans: HashMap<NameId, Span>,

    scopes: Vec<LoopScope>,
    current: Option<CurrentFn>,
    fatal: Cell<bool>,
}

impl<'a> Resolver<'a> {
    pub fn new(loader: &'a ModuleLoader, report: &'a Report) -> Resolver<'a> {
        Resolver {
            loader: loader,
            report: report,
            modules: HashSet::new(),
            filemap: HashMap::new(),
            types: HashMap::new(),
            constants: HashMap::new(),
            unresolved: HashMap::new(),
            const_exprs: HashMap::new(),
            decl_spans: HashMap::new(),
            scopes: Vec::new(),
            current: None,
            fatal: Cell::new(false),
        }
    }

    /// Resolves and lowers the given files into IL modules, in order.
    ///
    /// Returns `Err(Stop)` only after a fatal report (an internal failure);
    /// ordinary errors are reported, the offending declaration skipped, and
    /// the remainder still produced.
    pub fn run(&mut self, files: &[WhileyFile]) -> Result<Vec<Module>> {
        for f in files {
            self.modules.insert(f.module.clone());
        }

        self.generate_constants(files)?;
        self.generate_types(files)?;

        let mut modules = Vec::new();
        for f in files {
            modules.push(self.resolve_file(f)?);
        }
        Ok(modules)
    }

    /// The unit a declaration was read from, when it is known to this run.
    pub fn unit_of(&self, name: &NameId) -> Option<Unit> {
        self.filemap.get(name).cloned()
    }

    // ---------------------------------------------------------------------
    // declaration stages

    // visits every constant declaration and determines its value. a set
    // constant additionally registers a type: its members' type constrained
    // by membership of the set.
    fn generate_constants(&mut self, files: &[WhileyFile]) -> Result<()> {
        let mut order = Vec::new();
        for f in files {
            for d in &f.declarations {
                if let Decl::Constant(ref cd) = d.base {
                    let key = NameId::new(f.module.clone(), cd.name.base.clone());
                    order.push(key.clone());
                    self.const_exprs.insert(key.clone(), cd.expr.clone());
                    self.filemap.insert(key.clone(), f.unit);
                    self.decl_spans.insert(key, d.span);
                }
            }
        }

        for key in order {
            let span = self.decl_spans[&key];
            match self.expand_constant(&key, span, &mut HashSet::new()) {
                Ok(v) => {
                    if let Value::Set(_) = v {
                        let elem = v.ty().element().unwrap_or(T_VOID);
                        let label = fresh_label();
                        let mut blk = Block::new(1);
                        blk.append(Code::Load(THIS_SLOT), span);
                        blk.append(Code::Const(v), span);
                        blk.append(Code::IfGoto(COp::ElemOf, label.clone()), span);
                        blk.append(Code::Fail(m::type_constraint_not_satisfied(&key)), span);
                        blk.append(Code::Label(label), span);
                        self.types.insert(key, (elem, Some(blk)));
                    }
                }
                Err(Stop) => self.recover()?,
            }
        }
        Ok(())
    }

    // visits every type declaration, in declaration order, and expands it to
    // its structural form plus constraint block. declaration order matters
    // for how mutually recursive groups come out, exactly as it does for the
    // programmer reading them.
    fn generate_types(&mut self, files: &[WhileyFile]) -> Result<()> {
        let mut order = Vec::new();
        for f in files {
            for d in &f.declarations {
                if let Decl::Type(ref td) = d.base {
                    let key = NameId::new(f.module.clone(), td.name.base.clone());
                    order.push(key.clone());
                    self.unresolved.insert(key.clone(), (td.ty.clone(), td.constraint.clone()));
                    self.filemap.insert(key.clone(), f.unit);
                    self.decl_spans.insert(key, d.span);
                }
            }
        }

        for key in order {
            let span = self.decl_spans[&key];
            let mut cache = HashMap::new();
            match self.expand_type_name(&key, &mut cache, false, span) {
                Ok(p) => {
                    trace!("expanded type {} to {:?}", key, p.0);
                    self.types.insert(key, p);
                }
                Err(Stop) => self.recover()?,
            }
        }
        Ok(())
    }

    fn resolve_file(&mut self, f: &WhileyFile) -> Result<Module> {
        debug!("lowering module {}", f.module);
        let mut module = Module::new(f.module.clone());

        for d in &f.declarations {
            match d.base {
                Decl::Type(ref td) => {
                    let key = NameId::new(f.module.clone(), td.name.base.clone());
                    if let Some(&(ref ty, ref blk)) = self.types.get(&key) {
                        module.types.push(whiley_il::TypeDecl {
                            name: td.name.base.clone(),
                            ty: ty.clone(),
                            constraint: blk.clone(),
                        });
                    }
                }
                Decl::Constant(ref cd) => {
                    let key = NameId::new(f.module.clone(), cd.name.base.clone());
                    if let Some(v) = self.constants.get(&key) {
                        module.constants.push(whiley_il::ConstDecl {
                            name: cd.name.base.clone(),
                            value: v.clone(),
                        });
                    }
                }
                Decl::Function(ref fd) => {
                    match self.resolve_function(fd) {
                        Ok(func) => module.functions.push(func),
                        Err(Stop) => self.recover()?,
                    }
                }
            }
        }
        Ok(module)
    }

    fn resolve_function(&mut self, fd: &FunDecl) -> Result<whiley_il::FunctionDecl> {
        debug!("lowering function {}", fd.name.base);
        let nparams = fd.parameters.len() + if fd.receiver.is_some() { 1 } else { 0 };
        let mut env: HashMap<Name, usize> = HashMap::new();
        let mut param_index = 0;

        let mut receiver_ty = None;
        if let Some(ref r) = fd.receiver {
            // TODO: weave receiver constraints once the backend fixes a
            // receiver slot convention
            let (t, _constraint) = self.expand_in_context(r)?;
            receiver_ty = Some(t);
            env.insert("this".into(), param_index);
            param_index += 1;
        }

        // every constrained parameter type contributes to the precondition,
        // with the constraint's subject slot bound to the parameter's slot
        let mut precondition: Option<Block> = None;
        let mut param_tys = Vec::new();
        for p in &fd.parameters {
            let (t, constraint) = self.expand_in_context(&p.ty)?;
            if let Some(ref c) = constraint {
                if precondition.is_none() {
                    precondition = Some(Block::new(nparams));
                }
                if let Some(ref mut pre) = precondition {
                    let mut binding = VecMap::new();
                    binding.insert(THIS_SLOT, param_index);
                    pre.import_external(c, &binding);
                }
            }
            param_tys.push(t);
            env.insert(p.name.base.clone(), param_index);
            param_index += 1;
        }

        if let Some(ref cond) = fd.precondition {
            let lab = fresh_label();
            let mut pre_env = env.clone();
            let cblk = self.lower_condition(&lab, cond, &mut pre_env)?;
            if precondition.is_none() {
                precondition = Some(Block::new(nparams));
            }
            if let Some(ref mut pre) = precondition {
                pre.extend(cblk);
                pre.append(Code::Fail("precondition not satisfied".into()), cond.span);
                pre.append(Code::Label(lab), cond.span);
            }
        }

        // the postcondition runs over the post-state: slot 0 is the return
        // value and slots from 1 on are shadows of the original parameters
        let (ret_ty, ret_constraint) = self.expand_in_context(&fd.ret)?;
        let mut postcondition = None;
        if ret_constraint.is_some() || fd.postcondition.is_some() {
            let mut post = Block::new(nparams + 1);
            if let Some(ref c) = ret_constraint {
                let mut binding = VecMap::new();
                binding.insert(THIS_SLOT, 0);
                post.import_external(c, &binding);
            }
            if let Some(ref cond) = fd.postcondition {
                let mut post_env = HashMap::new();
                post_env.insert(Name::from("$"), 0);
                for (name, &slot) in &env {
                    post_env.insert(name.clone(), slot + 1);
                }
                let lab = fresh_label();
                let cblk = self.lower_condition(&lab, cond, &mut post_env)?;
                post.extend(cblk);
                post.append(Code::Fail("postcondition not satisfied".into()), cond.span);
                post.append(Code::Label(lab), cond.span);
            }
            postcondition = Some(post);
        }

        let fty = match receiver_ty {
            Some(recv) => Type::method(Some(recv), ret_ty.clone(), param_tys),
            None => Type::function(ret_ty.clone(), param_tys),
        };

        self.current = Some(CurrentFn { ret: ret_ty });
        let mut body = Block::new(nparams);
        for s in &fd.body {
            match self.lower_stmt(s, &mut env) {
                Ok(b) => body.extend(b),
                Err(Stop) => {
                    if self.fatal.get() {
                        self.current = None;
                        return Err(Stop);
                    }
                }
            }
        }
        self.current = None;

        Ok(whiley_il::FunctionDecl {
            name: fd.name.base.clone(),
            ty: fty,
            precondition: precondition,
            postcondition: postcondition,
            body: body,
        })
    }

    // ---------------------------------------------------------------------
    // reporting helpers

    // whether the per-declaration recovery can continue after a Stop
    fn recover(&self) -> Result<()> {
        if self.fatal.get() { Err(Stop) } else { Ok(()) }
    }

    fn syntax_error<T, L: Into<Span>, S: Into<String>>(&self, loc: L, msg: S) -> Result<T> {
        self.report.error(loc.into(), msg.into())?;
        Err(Stop)
    }

    fn internal_failure<T, L: Into<Span>, S: Into<String>>(&self, loc: L, msg: S) -> Result<T> {
        self.fatal.set(true);
        self.report.fatal(loc.into(), format!("internal failure: {}", msg.into()))
    }

    fn with_scope<T, F>(&mut self, scope: LoopScope, f: F) -> Result<T>
        where F: FnOnce(&mut Resolver<'a>) -> Result<T>
    {
        self.scopes.push(scope);
        let ret = f(self);
        self.scopes.pop();
        ret
    }
}
