//! A small reference evaluator for lowered blocks, so the end-to-end tests
//! can observe the behaviour of compiled programs instead of matching
//! instruction listings. Only the operations the suite exercises are
//! implemented; anything else reports itself loudly.

use std::collections::{BTreeMap, HashMap};

use whiley_il::{Block, Code, COp, BOp, OpDir, Value, Module, Label};
use whiley_types::{Leaf, Node, Type, T_REAL, T_VOID};

/// Calls a function of the module with the given arguments, running its
/// precondition (if any) first, exactly as a conforming backend would.
pub fn call(module: &Module, name: &str, args: Vec<Value>) -> Result<Value, String> {
    let f = match module.function(&name.into()) {
        Some(f) => f,
        None => return Err(format!("no function named {}", name)),
    };
    if let Some(ref pre) = f.precondition {
        exec_block(module, pre, args.clone())?;
    }
    let ret = exec_block(module, &f.body, args)?;
    let ret = ret.unwrap_or(Value::Null);
    if let Some(ref post) = f.postcondition {
        // slot 0 is the return value; parameter shadows are not reconstructed
        // here since the suite only checks return-value constraints
        exec_block(module, post, vec![ret.clone()])?;
    }
    Ok(ret)
}

/// Runs a constraint block over a single subject value.
pub fn check_constraint(module: &Module, constraint: &Block, subject: Value)
                        -> Result<(), String> {
    exec_block(module, constraint, vec![subject]).map(|_| ())
}

struct Frame {
    end: Label,
    end_pos: usize,
    start_pc: usize,
    // a `Loop` frame has no iteration state
    iter: Option<(usize, Vec<Value>, usize)>, // (slot, items, index)
}

pub fn exec_block(module: &Module, blk: &Block, args: Vec<Value>)
                  -> Result<Option<Value>, String> {
    let entries = blk.entries();

    // branch targets: a `Label` is landed on directly, while branching to a
    // loop label means leaving the loop, i.e. landing just past its `End`
    let mut targets: HashMap<&Label, usize> = HashMap::new();
    let mut end_positions: HashMap<&Label, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        match entry.code {
            Code::Label(ref l) => { targets.insert(l, i); }
            Code::End(ref l) => {
                targets.insert(l, i + 1);
                end_positions.insert(l, i);
            }
            _ => {}
        }
    }

    let mut slots = args;
    let mut stack: Vec<Value> = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    let mut pc = 0;

    macro_rules! pop {
        () => (match stack.pop() {
            Some(v) => v,
            None => return Err(format!("stack underflow at {}", pc)),
        })
    }
    macro_rules! store {
        ($slot:expr, $v:expr) => ({
            let slot = $slot;
            if slots.len() <= slot { slots.resize(slot + 1, Value::Null); }
            slots[slot] = $v;
        })
    }

    while pc < entries.len() {
        let mut jump: Option<usize> = None;

        match entries[pc].code {
            Code::Label(_) | Code::Skip | Code::Assert(_) => {}

            Code::Load(s) => {
                let v = slots.get(s).cloned().unwrap_or(Value::Null);
                stack.push(v);
            }
            Code::Store(s) => {
                let v = pop!();
                store!(s, v);
            }
            Code::Const(ref v) => stack.push(v.clone()),

            Code::Convert(ref ty) => {
                let v = pop!();
                stack.push(convert(v, ty));
            }

            Code::Destructure => {
                match pop!() {
                    Value::Tuple(vs) => stack.extend(vs),
                    v => return Err(format!("destructuring a non-tuple {:?}", v)),
                }
            }

            Code::BinOp(op) => {
                let rhs = pop!();
                let lhs = pop!();
                stack.push(binop(op, lhs, rhs)?);
            }

            Code::NewList(n) => {
                let items = pop_n(&mut stack, n)?;
                stack.push(Value::List(items));
            }
            Code::NewSet(n) => {
                let items = pop_n(&mut stack, n)?;
                stack.push(Value::Set(items.into_iter().collect()));
            }
            Code::NewTuple(n) => {
                let items = pop_n(&mut stack, n)?;
                stack.push(Value::Tuple(items));
            }
            Code::NewDict(n) => {
                let mut items = pop_n(&mut stack, n * 2)?;
                let mut dict = BTreeMap::new();
                while !items.is_empty() {
                    let k = items.remove(0);
                    let v = items.remove(0);
                    dict.insert(k, v);
                }
                stack.push(Value::Dictionary(dict));
            }
            Code::NewRecord(ref ty) => {
                let fields = match ty.fields() {
                    Some(fs) => fs,
                    None => return Err("NewRecord without a record type".into()),
                };
                let values = pop_n(&mut stack, fields.len())?;
                let record = fields.into_iter()
                                   .map(|(n, _)| n)
                                   .zip(values)
                                   .collect();
                stack.push(Value::Record(record));
            }

            Code::ListLoad => {
                let idx = pop!();
                let src = pop!();
                match (src, idx) {
                    (Value::List(vs), Value::Int(i)) => {
                        let i = int_to_usize(&i)?;
                        match vs.into_iter().nth(i) {
                            Some(v) => stack.push(v),
                            None => return Err("list index out of bounds".into()),
                        }
                    }
                    (src, idx) => return Err(format!("indexing {:?} with {:?}", src, idx)),
                }
            }
            Code::ListLength => {
                match pop!() {
                    Value::List(vs) => stack.push(Value::int(vs.len() as i64)),
                    Value::Strung(s) => stack.push(Value::int(s.chars().count() as i64)),
                    v => return Err(format!("taking the length of {:?}", v)),
                }
            }
            Code::SubList => {
                let end = pop!();
                let start = pop!();
                let src = pop!();
                match (src, start, end) {
                    (Value::List(vs), Value::Int(a), Value::Int(b)) => {
                        let a = int_to_usize(&a)?;
                        let b = int_to_usize(&b)?;
                        if a > b || b > vs.len() {
                            return Err("sublist out of bounds".into());
                        }
                        stack.push(Value::List(vs[a..b].to_vec()));
                    }
                    _ => return Err("sublist of a non-list".into()),
                }
            }
            Code::FieldLoad(ref name) => {
                match pop!() {
                    Value::Record(fields) => {
                        match fields.get(name) {
                            Some(v) => stack.push(v.clone()),
                            None => return Err(format!("no field {}", name)),
                        }
                    }
                    v => return Err(format!("field access on {:?}", v)),
                }
            }
            Code::TupleLoad(i) => {
                match pop!() {
                    Value::Tuple(vs) => {
                        match vs.into_iter().nth(i) {
                            Some(v) => stack.push(v),
                            None => return Err("tuple index out of bounds".into()),
                        }
                    }
                    v => return Err(format!("tuple access on {:?}", v)),
                }
            }

            Code::SetUnion(dir) => {
                let rhs = pop!();
                let lhs = pop!();
                stack.push(set_union(dir, lhs, rhs)?);
            }
            Code::SetIntersect(_) => {
                let rhs = pop!();
                let lhs = pop!();
                match (lhs, rhs) {
                    (Value::Set(a), Value::Set(b)) => {
                        stack.push(Value::Set(a.intersection(&b).cloned().collect()));
                    }
                    _ => return Err("intersecting non-sets".into()),
                }
            }

            Code::Update { slot, depth, ref fields } => {
                let rhs = pop!();
                let nindices = depth - fields.len();
                let mut indices = pop_n(&mut stack, nindices)?;
                let mut subject = slots.get(slot).cloned().unwrap_or(Value::Null);
                update_value(&mut subject, depth, &mut indices, &mut fields.clone(), rhs)?;
                store!(slot, subject);
            }

            Code::Goto(ref l) => jump = Some(target_of(l, &targets)?),

            Code::IfGoto(cop, ref l) => {
                let rhs = pop!();
                let lhs = pop!();
                if compare(cop, &lhs, &rhs)? {
                    jump = Some(target_of(l, &targets)?);
                }
            }

            Code::IfType { slot, ref ty, ref target } => {
                let v = match slot {
                    Some(s) => slots.get(s).cloned().unwrap_or(Value::Null),
                    None => pop!(),
                };
                if instance_of(&v, ty) {
                    jump = Some(target_of(target, &targets)?);
                }
            }

            Code::Switch { ref default, ref cases } => {
                let v = pop!();
                let mut hit = None;
                for &(ref case, ref l) in cases {
                    if *case == v {
                        hit = Some(target_of(l, &targets)?);
                        break;
                    }
                }
                jump = Some(match hit {
                    Some(t) => t,
                    None => target_of(default, &targets)?,
                });
            }

            Code::ForAll { slot, ref end, ref modified } => {
                let _ = modified;
                let items = match pop!() {
                    Value::List(vs) => vs,
                    Value::Set(vs) => vs.into_iter().collect(),
                    v => return Err(format!("iterating {:?}", v)),
                };
                let end_pos = match end_positions.get(end) {
                    Some(&p) => p,
                    None => return Err(format!("loop {} has no end", end)),
                };
                if items.is_empty() {
                    jump = Some(end_pos + 1);
                } else {
                    store!(slot, items[0].clone());
                    frames.push(Frame {
                        end: end.clone(),
                        end_pos: end_pos,
                        start_pc: pc + 1,
                        iter: Some((slot, items, 0)),
                    });
                }
            }

            Code::Loop { ref end, .. } => {
                let end_pos = match end_positions.get(end) {
                    Some(&p) => p,
                    None => return Err(format!("loop {} has no end", end)),
                };
                frames.push(Frame {
                    end: end.clone(),
                    end_pos: end_pos,
                    start_pc: pc + 1,
                    iter: None,
                });
            }

            Code::End(ref l) => {
                let (repeat, done) = {
                    let frame = match frames.last_mut() {
                        Some(f) => f,
                        None => return Err(format!("end {} outside a loop", l)),
                    };
                    if frame.end != *l {
                        return Err(format!("mismatched loop end {}", l));
                    }
                    match frame.iter {
                        Some((slot, ref items, ref mut idx)) => {
                            if *idx + 1 < items.len() {
                                *idx += 1;
                                store!(slot, items[*idx].clone());
                                (Some(frame.start_pc), false)
                            } else {
                                (None, true)
                            }
                        }
                        None => (Some(frame.start_pc), false),
                    }
                };
                if done {
                    frames.pop();
                } else if let Some(start) = repeat {
                    jump = Some(start);
                }
            }

            Code::Fail(ref msg) => return Err(msg.clone()),

            Code::Invoke { ref name, ref ty, retval } => {
                if name.module != module.id {
                    return Err(format!("cross-module call to {}", name));
                }
                let nargs = ty.params().map(|p| p.len()).unwrap_or(0);
                let call_args = pop_n(&mut stack, nargs)?;
                let result = call(module, name.name.as_str(), call_args)?;
                if retval {
                    stack.push(result);
                }
            }

            Code::Return(ref ty) => {
                if *ty == T_VOID {
                    return Ok(None);
                }
                let v = pop!();
                return Ok(Some(v));
            }

            Code::Debug => { let _ = pop!(); }

            ref code => return Err(format!("unsupported operation {:?}", code)),
        }

        match jump {
            Some(target) => {
                // leaving a loop pops its frame
                while let Some(frame) = frames.last() {
                    if frame.end_pos < target {
                        frames.pop();
                    } else {
                        break;
                    }
                }
                pc = target;
            }
            None => pc += 1,
        }
    }

    Ok(None)
}

fn target_of(l: &Label, targets: &HashMap<&Label, usize>) -> Result<usize, String> {
    match targets.get(l) {
        Some(&t) => Ok(t),
        None => Err(format!("branch to unknown label {}", l)),
    }
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, String> {
    if stack.len() < n {
        return Err("stack underflow".into());
    }
    let at = stack.len() - n;
    Ok(stack.split_off(at))
}

fn int_to_usize(i: &::num_bigint::BigInt) -> Result<usize, String> {
    use num_traits::ToPrimitive;
    i.to_usize().ok_or_else(|| "index out of range".to_string())
}

fn convert(v: Value, ty: &Type) -> Value {
    match v {
        Value::Int(i) => {
            if *ty == T_REAL {
                Value::Real(::num_rational::BigRational::from_integer(i))
            } else {
                Value::Int(i)
            }
        }
        v => v,
    }
}

fn binop(op: BOp, lhs: Value, rhs: Value) -> Result<Value, String> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            match op {
                BOp::Add => Ok(Value::Int(a + b)),
                BOp::Sub => Ok(Value::Int(a - b)),
                BOp::Mul => Ok(Value::Int(a * b)),
                BOp::Div => Ok(Value::Int(a / b)),
                BOp::Rem => Ok(Value::Int(a % b)),
                BOp::Range => {
                    use num_traits::One;
                    let mut items = Vec::new();
                    let mut i = a;
                    while i < b {
                        items.push(Value::Int(i.clone()));
                        i = i + ::num_bigint::BigInt::one();
                    }
                    Ok(Value::List(items))
                }
                _ => Err(format!("unsupported integer operation {:?}", op)),
            }
        }
        (Value::Real(a), Value::Real(b)) => {
            match op {
                BOp::Add => Ok(Value::Real(a + b)),
                BOp::Sub => Ok(Value::Real(a - b)),
                BOp::Mul => Ok(Value::Real(a * b)),
                BOp::Div => Ok(Value::Real(a / b)),
                _ => Err(format!("unsupported rational operation {:?}", op)),
            }
        }
        (Value::Int(a), Value::Real(b)) => {
            binop(op, Value::Real(::num_rational::BigRational::from_integer(a)),
                  Value::Real(b))
        }
        (Value::Real(a), Value::Int(b)) => {
            binop(op, Value::Real(a),
                  Value::Real(::num_rational::BigRational::from_integer(b)))
        }
        (Value::List(mut a), Value::List(b)) => {
            match op {
                BOp::Add => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                _ => Err(format!("unsupported list operation {:?}", op)),
            }
        }
        (Value::Set(a), Value::Set(b)) => {
            match op {
                BOp::Sub => Ok(Value::Set(a.difference(&b).cloned().collect())),
                _ => Err(format!("unsupported set operation {:?}", op)),
            }
        }
        (Value::Bool(a), Value::Bool(b)) => {
            match op {
                BOp::And => Ok(Value::Bool(a & b)),
                BOp::Or => Ok(Value::Bool(a | b)),
                BOp::Xor => Ok(Value::Bool(a ^ b)),
                _ => Err(format!("unsupported boolean operation {:?}", op)),
            }
        }
        (Value::Byte(a), Value::Byte(b)) => {
            match op {
                BOp::And => Ok(Value::Byte(a & b)),
                BOp::Or => Ok(Value::Byte(a | b)),
                BOp::Xor => Ok(Value::Byte(a ^ b)),
                _ => Err(format!("unsupported byte operation {:?}", op)),
            }
        }
        (lhs, rhs) => Err(format!("binary operation {:?} on {:?} and {:?}", op, lhs, rhs)),
    }
}

fn set_union(dir: OpDir, lhs: Value, rhs: Value) -> Result<Value, String> {
    match dir {
        OpDir::Uniform => {
            match (lhs, rhs) {
                (Value::Set(a), Value::Set(b)) => {
                    Ok(Value::Set(a.union(&b).cloned().collect()))
                }
                _ => Err("uniform union of non-sets".into()),
            }
        }
        OpDir::Left => {
            // the left operand is the collection, the right a single element
            match lhs {
                Value::Set(mut s) => {
                    s.insert(rhs);
                    Ok(Value::Set(s))
                }
                Value::List(mut vs) => {
                    vs.push(rhs);
                    Ok(Value::List(vs))
                }
                v => Err(format!("accumulating into {:?}", v)),
            }
        }
        OpDir::Right => {
            match rhs {
                Value::Set(mut s) => {
                    s.insert(lhs);
                    Ok(Value::Set(s))
                }
                v => Err(format!("accumulating into {:?}", v)),
            }
        }
    }
}

fn update_value(subject: &mut Value, depth: usize, indices: &mut Vec<Value>,
                fields: &mut Vec<::whiley_env::Name>, rhs: Value) -> Result<(), String> {
    if depth == 0 {
        *subject = rhs;
        return Ok(());
    }
    match *subject {
        Value::Record(ref mut rec) => {
            if fields.is_empty() {
                return Err("record update without a field".into());
            }
            let name = fields.remove(0);
            match rec.get_mut(&name) {
                Some(inner) => update_value(inner, depth - 1, indices, fields, rhs),
                None => Err(format!("no field {}", name)),
            }
        }
        Value::List(ref mut vs) => {
            if indices.is_empty() {
                return Err("list update without an index".into());
            }
            let idx = match indices.remove(0) {
                Value::Int(i) => int_to_usize(&i)?,
                v => return Err(format!("indexing with {:?}", v)),
            };
            match vs.get_mut(idx) {
                Some(inner) => update_value(inner, depth - 1, indices, fields, rhs),
                None => Err("list index out of bounds".into()),
            }
        }
        Value::Dictionary(ref mut map) => {
            if indices.is_empty() {
                return Err("dictionary update without a key".into());
            }
            let key = indices.remove(0);
            let inner = map.entry(key).or_insert(Value::Null);
            update_value(inner, depth - 1, indices, fields, rhs)
        }
        ref v => Err(format!("updating into {:?}", v)),
    }
}

fn compare(cop: COp, lhs: &Value, rhs: &Value) -> Result<bool, String> {
    match cop {
        COp::Eq => Ok(lhs == rhs),
        COp::Neq => Ok(lhs != rhs),
        COp::Lt | COp::LtEq | COp::Gt | COp::GtEq => {
            let ord = numeric_cmp(lhs, rhs)?;
            Ok(match cop {
                COp::Lt => ord == ::std::cmp::Ordering::Less,
                COp::LtEq => ord != ::std::cmp::Ordering::Greater,
                COp::Gt => ord == ::std::cmp::Ordering::Greater,
                _ => ord != ::std::cmp::Ordering::Less,
            })
        }
        COp::ElemOf => {
            match *rhs {
                Value::List(ref vs) => Ok(vs.contains(lhs)),
                Value::Set(ref vs) => Ok(vs.contains(lhs)),
                ref v => Err(format!("membership test on {:?}", v)),
            }
        }
        COp::Subset | COp::SubsetEq => {
            match (lhs, rhs) {
                (&Value::Set(ref a), &Value::Set(ref b)) => {
                    let subset = a.is_subset(b);
                    if cop == COp::Subset {
                        Ok(subset && a != b)
                    } else {
                        Ok(subset)
                    }
                }
                _ => Err("subset test on non-sets".into()),
            }
        }
    }
}

fn numeric_cmp(lhs: &Value, rhs: &Value) -> Result<::std::cmp::Ordering, String> {
    match (lhs, rhs) {
        (&Value::Int(ref a), &Value::Int(ref b)) => Ok(a.cmp(b)),
        (&Value::Real(ref a), &Value::Real(ref b)) => Ok(a.cmp(b)),
        (&Value::Int(ref a), &Value::Real(ref b)) => {
            Ok(::num_rational::BigRational::from_integer(a.clone()).cmp(b))
        }
        (&Value::Real(ref a), &Value::Int(ref b)) => {
            Ok(a.cmp(&::num_rational::BigRational::from_integer(b.clone())))
        }
        (a, b) => Err(format!("comparing {:?} and {:?}", a, b)),
    }
}

/// The runtime type test backing `IfType`.
pub fn instance_of(v: &Value, ty: &Type) -> bool {
    match *ty {
        Type::Leaf(leaf) => leaf_instance(v, leaf),
        Type::Compound(ref c) => node_instance(v, c.nodes(), 0),
    }
}

fn leaf_instance(v: &Value, leaf: Leaf) -> bool {
    match leaf {
        Leaf::Any => true,
        Leaf::Void => false,
        Leaf::Null => *v == Value::Null,
        Leaf::Bool => match *v { Value::Bool(_) => true, _ => false },
        Leaf::Byte => match *v { Value::Byte(_) => true, _ => false },
        Leaf::Char => match *v { Value::Char(_) => true, _ => false },
        Leaf::Int => match *v { Value::Int(_) => true, _ => false },
        Leaf::Real => match *v { Value::Int(_) | Value::Real(_) => true, _ => false },
        Leaf::Strung => match *v { Value::Strung(_) => true, _ => false },
    }
}

fn node_instance(v: &Value, nodes: &[Node], at: usize) -> bool {
    match nodes[at] {
        Node::Leaf(leaf) => leaf_instance(v, leaf),
        Node::List(e) => {
            match *v {
                Value::List(ref vs) => vs.iter().all(|x| node_instance(x, nodes, e)),
                _ => false,
            }
        }
        Node::Set(e) => {
            match *v {
                Value::Set(ref vs) => vs.iter().all(|x| node_instance(x, nodes, e)),
                _ => false,
            }
        }
        Node::Dictionary(k, val) => {
            match *v {
                Value::Dictionary(ref map) => {
                    map.iter().all(|(mk, mv)| {
                        node_instance(mk, nodes, k) && node_instance(mv, nodes, val)
                    })
                }
                _ => false,
            }
        }
        Node::Tuple(ref elems) => {
            match *v {
                Value::Tuple(ref vs) => {
                    vs.len() == elems.len() &&
                        vs.iter().zip(elems.iter()).all(|(x, &e)| node_instance(x, nodes, e))
                }
                _ => false,
            }
        }
        Node::Record(open, ref fields) => {
            match *v {
                Value::Record(ref rec) => {
                    if !open && rec.len() != fields.len() {
                        return false;
                    }
                    fields.iter().all(|&(ref name, e)| {
                        match rec.get(name) {
                            Some(x) => node_instance(x, nodes, e),
                            None => false,
                        }
                    }) && (open || fields.iter().map(|&(ref n, _)| n.clone())
                                          .eq(rec.keys().cloned()))
                }
                _ => false,
            }
        }
        Node::Union(ref bounds) => bounds.iter().any(|&b| node_instance(v, nodes, b)),
        Node::Intersection(ref bounds) => {
            bounds.iter().all(|&b| node_instance(v, nodes, b))
        }
        Node::Negation(e) => !node_instance(v, nodes, e),
        Node::Function(_) | Node::Method(..) => {
            match *v { Value::FunConst(..) => true, _ => false }
        }
        Node::Reference(_) | Node::Process(_) | Node::Nominal(_) | Node::Label(_) => false,
    }
}
