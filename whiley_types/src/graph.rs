use std::sync::Arc;
use std::borrow::Cow;

use whiley_env::{Name, NameId};
use minimise::minimise;

/// A primitive type without any component types.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Leaf {
    /// The bottom type; no value inhabits it.
    Void,
    /// The top type; every value inhabits it.
    Any,
    /// The type of the single `null` value.
    Null,
    Bool,
    Byte,
    Char,
    /// Unbounded integers.
    Int,
    /// Unbounded rationals.
    Real,
    /// Character strings. (Named to keep the host `String` importable alongside.)
    Strung,
}

pub const T_VOID: Type = Type::Leaf(Leaf::Void);
pub const T_ANY: Type = Type::Leaf(Leaf::Any);
pub const T_NULL: Type = Type::Leaf(Leaf::Null);
pub const T_BOOL: Type = Type::Leaf(Leaf::Bool);
pub const T_BYTE: Type = Type::Leaf(Leaf::Byte);
pub const T_CHAR: Type = Type::Leaf(Leaf::Char);
pub const T_INT: Type = Type::Leaf(Leaf::Int);
pub const T_REAL: Type = Type::Leaf(Leaf::Real);
pub const T_STRING: Type = Type::Leaf(Leaf::Strung);

/// A single node in a type graph. Child edges are indices into the same node array.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Node {
    Leaf(Leaf),
    Set(usize),
    List(usize),
    Reference(usize),
    Process(usize),
    Negation(usize),
    Dictionary(usize, usize),
    Union(Vec<usize>),
    Intersection(Vec<usize>),
    Tuple(Vec<usize>),
    /// Element 0 is the return type, the remainder are parameters.
    Function(Vec<usize>),
    /// An optional receiver, then the return type and parameters as in `Function`.
    Method(Option<usize>, Vec<usize>),
    /// The open flag and the fields, sorted by name.
    Record(bool, Vec<(Name, usize)>),
    /// A named placeholder, either for a recursive type under construction or
    /// for a type declared in another module.
    Nominal(NameId),
    /// A placeholder leaf used while building recursive types; a closed type
    /// contains none of these.
    Label(Name),
}

impl Node {
    /// Rewrites every child edge through the given function.
    pub fn map_children<F: FnMut(usize) -> usize>(&self, mut f: F) -> Node {
        match *self {
            Node::Leaf(l) => Node::Leaf(l),
            Node::Set(e) => Node::Set(f(e)),
            Node::List(e) => Node::List(f(e)),
            Node::Reference(e) => Node::Reference(f(e)),
            Node::Process(e) => Node::Process(f(e)),
            Node::Negation(e) => Node::Negation(f(e)),
            Node::Dictionary(k, v) => Node::Dictionary(f(k), f(v)),
            Node::Union(ref bounds) => Node::Union(bounds.iter().map(|&b| f(b)).collect()),
            Node::Intersection(ref bounds) => {
                Node::Intersection(bounds.iter().map(|&b| f(b)).collect())
            }
            Node::Tuple(ref elems) => Node::Tuple(elems.iter().map(|&e| f(e)).collect()),
            Node::Function(ref elems) => Node::Function(elems.iter().map(|&e| f(e)).collect()),
            Node::Method(recv, ref elems) => {
                Node::Method(recv.map(&mut f), elems.iter().map(|&e| f(e)).collect())
            }
            Node::Record(open, ref fields) => {
                Node::Record(open,
                             fields.iter().map(|&(ref n, e)| (n.clone(), f(e))).collect())
            }
            Node::Nominal(ref name) => Node::Nominal(name.clone()),
            Node::Label(ref name) => Node::Label(name.clone()),
        }
    }

    /// Calls the given function for every child edge, in a fixed order.
    pub fn for_each_child<F: FnMut(usize)>(&self, mut f: F) {
        match *self {
            Node::Leaf(_) | Node::Nominal(_) | Node::Label(_) => {}
            Node::Set(e) | Node::List(e) | Node::Reference(e) |
            Node::Process(e) | Node::Negation(e) => f(e),
            Node::Dictionary(k, v) => { f(k); f(v); }
            Node::Union(ref es) | Node::Intersection(ref es) |
            Node::Tuple(ref es) | Node::Function(ref es) => {
                for &e in es { f(e); }
            }
            Node::Method(recv, ref es) => {
                if let Some(r) = recv { f(r); }
                for &e in es { f(e); }
            }
            Node::Record(_, ref fields) => {
                for &(_, e) in fields { f(e); }
            }
        }
    }
}

/// A compound type: a non-empty flat array of nodes with node 0 as the root.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Compound {
    nodes: Arc<Vec<Node>>,
}

impl Compound {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// The closing of a recursive type failed because no matching label was found.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct NoSuchLabel;

/// A structural type, either a primitive leaf or a compound graph.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Leaf(Leaf),
    Compound(Compound),
}

/// Returns the node array of a type; a leaf becomes a single-node array.
pub fn components(t: &Type) -> Cow<[Node]> {
    match *t {
        Type::Leaf(l) => Cow::Owned(vec![Node::Leaf(l)]),
        Type::Compound(ref c) => Cow::Borrowed(c.nodes()),
    }
}

/// Wraps a node array into a type, unwrapping a single leaf node back to `Type::Leaf`.
pub fn construct(nodes: Vec<Node>) -> Type {
    assert!(!nodes.is_empty());
    if nodes.len() == 1 {
        if let Node::Leaf(l) = nodes[0] {
            return Type::Leaf(l);
        }
    }
    Type::Compound(Compound { nodes: Arc::new(nodes) })
}

/// Like `construct`, but additionally minimises the graph whenever it is closed.
/// Open graphs (those containing labels) cannot be minimised yet; they become
/// canonical when the enclosing recursive type is closed.
pub fn canonical(nodes: Vec<Node>) -> Type {
    let open = nodes.iter().any(|n| match *n { Node::Label(_) => true, _ => false });
    let t = construct(nodes);
    if open { t } else { minimise(&t) }
}

/// Splices the nodes of `t` at the end of `dst`, remapping child edges, and
/// returns the index the root of `t` landed on.
fn splice(dst: &mut Vec<Node>, t: &Type) -> usize {
    let start = dst.len();
    for node in components(t).iter() {
        dst.push(node.map_children(|c| c + start));
    }
    start
}

impl Type {
    // ---------------------------------------------------------------------
    // constructors

    pub fn set(element: Type) -> Type {
        Type::unary(Node::Set(1), element)
    }

    pub fn list(element: Type) -> Type {
        Type::unary(Node::List(1), element)
    }

    pub fn reference(element: Type) -> Type {
        Type::unary(Node::Reference(1), element)
    }

    pub fn process(element: Type) -> Type {
        Type::unary(Node::Process(1), element)
    }

    /// The raw negation node; `algebra::negation` additionally simplifies.
    pub fn negation(element: Type) -> Type {
        Type::unary(Node::Negation(1), element)
    }

    fn unary(root: Node, element: Type) -> Type {
        let mut nodes = vec![root];
        splice(&mut nodes, &element);
        canonical(nodes)
    }

    pub fn dictionary(key: Type, value: Type) -> Type {
        let mut nodes = vec![Node::Leaf(Leaf::Void)]; // placeholder root
        let k = splice(&mut nodes, &key);
        let v = splice(&mut nodes, &value);
        nodes[0] = Node::Dictionary(k, v);
        canonical(nodes)
    }

    pub fn tuple(elements: Vec<Type>) -> Type {
        let mut nodes = vec![Node::Leaf(Leaf::Void)];
        let children = elements.iter().map(|e| splice(&mut nodes, e)).collect();
        nodes[0] = Node::Tuple(children);
        canonical(nodes)
    }

    /// Builds a record type; fields are sorted by name.
    pub fn record(open: bool, mut fields: Vec<(Name, Type)>) -> Type {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let mut nodes = vec![Node::Leaf(Leaf::Void)];
        let children = fields.iter()
                             .map(|&(ref n, ref t)| (n.clone(), splice(&mut nodes, t)))
                             .collect();
        nodes[0] = Node::Record(open, children);
        canonical(nodes)
    }

    /// Builds a union type over the given bounds. Nested unions are inlined
    /// (one level suffices since the inputs are themselves canonical), bounds
    /// are sorted and duplicates dropped. Zero bounds give `void`, a single
    /// bound gives the bound itself.
    pub fn union_of(bounds: Vec<Type>) -> Type {
        let mut flat = Vec::new();
        for b in bounds {
            match b.bounds_of_union() {
                Some(inner) => flat.extend(inner),
                None => flat.push(b),
            }
        }
        flat.sort();
        flat.dedup();

        match flat.len() {
            0 => T_VOID,
            1 => flat.pop().unwrap(),
            _ => {
                let mut nodes = vec![Node::Leaf(Leaf::Void)];
                let children = flat.iter().map(|b| splice(&mut nodes, b)).collect();
                nodes[0] = Node::Union(children);
                canonical(nodes)
            }
        }
    }

    /// Builds an intersection type over the given bounds, verbatim.
    /// The public greatest-lower-bound operation normalises through De Morgan
    /// instead, so canonical types produced by the algebra contain no
    /// intersection nodes; this constructor exists for programmatic clients.
    pub fn intersection_of(bounds: Vec<Type>) -> Type {
        assert!(!bounds.is_empty(), "intersection requires at least one bound");
        if bounds.len() == 1 {
            return bounds.into_iter().next().unwrap();
        }
        let mut nodes = vec![Node::Leaf(Leaf::Void)];
        let children = bounds.iter().map(|b| splice(&mut nodes, b)).collect();
        nodes[0] = Node::Intersection(children);
        canonical(nodes)
    }

    pub fn function(ret: Type, params: Vec<Type>) -> Type {
        let mut nodes = vec![Node::Leaf(Leaf::Void)];
        let mut children = vec![splice(&mut nodes, &ret)];
        children.extend(params.iter().map(|p| splice(&mut nodes, p)));
        nodes[0] = Node::Function(children);
        canonical(nodes)
    }

    pub fn method(receiver: Option<Type>, ret: Type, params: Vec<Type>) -> Type {
        let mut nodes = vec![Node::Leaf(Leaf::Void)];
        let recv = receiver.as_ref().map(|r| splice(&mut nodes, r));
        let mut children = vec![splice(&mut nodes, &ret)];
        children.extend(params.iter().map(|p| splice(&mut nodes, p)));
        nodes[0] = Node::Method(recv, children);
        canonical(nodes)
    }

    pub fn nominal(name: NameId) -> Type {
        construct(vec![Node::Nominal(name)])
    }

    /// A label placeholder for building recursive types; see `Type::recursive`.
    pub fn label<N: Into<Name>>(name: N) -> Type {
        construct(vec![Node::Label(name.into())])
    }

    // ---------------------------------------------------------------------
    // recursive closing

    /// Closes a recursive type over the given label. Every node carrying a
    /// matching label is re-targeted to the root and removed from the array,
    /// shifting all following nodes down. For example, `X<null|{X next}>` is
    /// built by unioning `null` with a record whose `next` field is
    /// `Type::label("X")`, then closing over `"X"`.
    pub fn recursive(label: &Name, ty: &Type) -> Result<Type, NoSuchLabel> {
        Type::close_on(ty, |node| match *node {
            Node::Label(ref l) => l == label,
            _ => false,
        })
    }

    /// Closes a recursive type over nominal placeholders for the given name.
    /// This is the closing performed after expanding a named type whose
    /// definition mentions itself.
    pub fn close_recursive(name: &NameId, ty: &Type) -> Result<Type, NoSuchLabel> {
        Type::close_on(ty, |node| match *node {
            Node::Nominal(ref n) => n == name,
            _ => false,
        })
    }

    fn close_on<F: Fn(&Node) -> bool>(ty: &Type, is_target: F) -> Result<Type, NoSuchLabel> {
        let nodes = match *ty {
            Type::Leaf(_) => return Err(NoSuchLabel),
            Type::Compound(ref c) => c.nodes(),
        };

        // first stage, identify all matching placeholders
        let mut rmap = Vec::with_capacity(nodes.len());
        let mut nmatches = 0;
        for node in nodes {
            if is_target(node) {
                rmap.push(0);
                nmatches += 1;
            } else {
                rmap.push(rmap.len() - nmatches);
            }
        }
        if nmatches == 0 {
            return Err(NoSuchLabel);
        }

        // second stage, rewrite every other node through the remap
        let mut closed = Vec::with_capacity(nodes.len() - nmatches);
        for node in nodes {
            if !is_target(node) {
                closed.push(node.map_children(|c| rmap[c]));
            }
        }
        Ok(canonical(closed))
    }

    /// Whether the type still contains a nominal placeholder for given name,
    /// i.e. whether it is *open* on that name.
    pub fn is_open_on(&self, name: &NameId) -> bool {
        match *self {
            Type::Leaf(_) => false,
            Type::Compound(ref c) => c.nodes().iter().any(|n| match *n {
                Node::Nominal(ref m) => m == name,
                _ => false,
            }),
        }
    }

    /// Whether the type contains a label, i.e. is still under construction.
    pub fn contains_label(&self) -> bool {
        match *self {
            Type::Leaf(_) => false,
            Type::Compound(ref c) => c.nodes().iter().any(|n| match *n {
                Node::Label(_) => true,
                _ => false,
            }),
        }
    }

    // ---------------------------------------------------------------------
    // accessors

    fn root(&self) -> Option<&Node> {
        match *self {
            Type::Leaf(_) => None,
            Type::Compound(ref c) => Some(&c.nodes()[0]),
        }
    }

    /// The element type of a set, list, reference, process or negation.
    pub fn element(&self) -> Option<Type> {
        match self.root() {
            Some(&Node::Set(e)) | Some(&Node::List(e)) | Some(&Node::Reference(e)) |
            Some(&Node::Process(e)) | Some(&Node::Negation(e)) => Some(self.extract(e)),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<Type> {
        match self.root() {
            Some(&Node::Dictionary(k, _)) => Some(self.extract(k)),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<Type> {
        match self.root() {
            Some(&Node::Dictionary(_, v)) => Some(self.extract(v)),
            _ => None,
        }
    }

    /// The fields of a record type, in name order.
    pub fn fields(&self) -> Option<Vec<(Name, Type)>> {
        match self.root() {
            Some(&Node::Record(_, ref fields)) => {
                Some(fields.iter().map(|&(ref n, e)| (n.clone(), self.extract(e))).collect())
            }
            _ => None,
        }
    }

    pub fn field(&self, name: &Name) -> Option<Type> {
        match self.root() {
            Some(&Node::Record(_, ref fields)) => {
                fields.iter().find(|&&(ref n, _)| n == name).map(|&(_, e)| self.extract(e))
            }
            _ => None,
        }
    }

    pub fn is_open_record(&self) -> bool {
        match self.root() {
            Some(&Node::Record(open, _)) => open,
            _ => false,
        }
    }

    /// The bounds of a union type. (Used by the union constructor to inline
    /// nested unions, hence the dedicated name.)
    fn bounds_of_union(&self) -> Option<Vec<Type>> {
        match self.root() {
            Some(&Node::Union(ref bounds)) => {
                Some(bounds.iter().map(|&b| self.extract(b)).collect())
            }
            _ => None,
        }
    }

    /// The bounds of a union or intersection type.
    pub fn bounds(&self) -> Option<Vec<Type>> {
        match self.root() {
            Some(&Node::Union(ref bounds)) | Some(&Node::Intersection(ref bounds)) => {
                Some(bounds.iter().map(|&b| self.extract(b)).collect())
            }
            _ => None,
        }
    }

    /// The return type of a function or method type.
    pub fn ret(&self) -> Option<Type> {
        match self.root() {
            Some(&Node::Function(ref elems)) | Some(&Node::Method(_, ref elems)) => {
                Some(self.extract(elems[0]))
            }
            _ => None,
        }
    }

    /// The parameter types of a function or method type.
    pub fn params(&self) -> Option<Vec<Type>> {
        match self.root() {
            Some(&Node::Function(ref elems)) | Some(&Node::Method(_, ref elems)) => {
                Some(elems[1..].iter().map(|&e| self.extract(e)).collect())
            }
            _ => None,
        }
    }

    pub fn receiver(&self) -> Option<Type> {
        match self.root() {
            Some(&Node::Method(Some(recv), _)) => Some(self.extract(recv)),
            _ => None,
        }
    }

    pub fn tuple_elements(&self) -> Option<Vec<Type>> {
        match self.root() {
            Some(&Node::Tuple(ref elems)) => {
                Some(elems.iter().map(|&e| self.extract(e)).collect())
            }
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        match self.root() {
            Some(&Node::Function(_)) => true,
            _ => false,
        }
    }

    pub fn is_method(&self) -> bool {
        match self.root() {
            Some(&Node::Method(..)) => true,
            _ => false,
        }
    }

    /// Extracts the subgraph reachable from given node into a fresh canonical
    /// type. This performs a DFS which copies the reachable nodes in visit
    /// order, then remaps every edge through the resulting index map.
    pub fn extract(&self, root: usize) -> Type {
        let nodes = match *self {
            Type::Leaf(l) => {
                assert!(root == 0);
                return Type::Leaf(l);
            }
            Type::Compound(ref c) => c.nodes(),
        };

        // `order` lists old indices in visit order; `newidx[old]` is the new index
        let mut order = Vec::new();
        let mut newidx = vec![None; nodes.len()];
        let mut stack = vec![root];
        // a DFS using an explicit stack; the exact visit order only needs to
        // be deterministic, not any particular one
        while let Some(i) = stack.pop() {
            if newidx[i].is_some() { continue; }
            newidx[i] = Some(order.len());
            order.push(i);
            let mut children = Vec::new();
            nodes[i].for_each_child(|c| children.push(c));
            for &c in children.iter().rev() {
                if newidx[c].is_none() { stack.push(c); }
            }
        }

        let extracted = order.iter()
                             .map(|&i| nodes[i].map_children(|c| newidx[c].unwrap()))
                             .collect();
        canonical(extracted)
    }
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
fn linked_list() -> Type {
    // X<null | {int data, X next}>
    let fields = vec![("data".into(), T_INT), ("next".into(), Type::label("X"))];
    let tmp = Type::union_of(vec![T_NULL, Type::record(false, fields)]);
    Type::recursive(&"X".into(), &tmp).unwrap()
}

#[test]
fn test_recursive_close_and_extract() {
    let list = linked_list();
    assert!(!list.contains_label());

    // the type of the `next` field must be the whole type again
    let bounds = list.bounds().unwrap();
    let rec = bounds.iter().find(|b| b.fields().is_some()).unwrap();
    let next = rec.field(&"next".into()).unwrap();
    assert_eq!(next, list);

    // the `data` field is a plain leaf
    assert_eq!(rec.field(&"data".into()), Some(T_INT));
}

#[test]
fn test_close_without_label_fails() {
    let t = Type::union_of(vec![T_NULL, T_INT]);
    assert_eq!(Type::recursive(&"X".into(), &t), Err(NoSuchLabel));
    assert_eq!(Type::recursive(&"X".into(), &T_INT), Err(NoSuchLabel));
}

#[test]
fn test_record_fields_sorted() {
    let t = Type::record(false, vec![("y".into(), T_INT), ("x".into(), T_REAL)]);
    let fields = t.fields().unwrap();
    assert_eq!(fields[0].0.as_str(), "x");
    assert_eq!(fields[0].1, T_REAL);
    assert_eq!(fields[1].0.as_str(), "y");
    assert_eq!(fields[1].1, T_INT);
}

#[test]
fn test_union_flattening() {
    let u1 = Type::union_of(vec![T_NULL, T_BOOL]);
    let u2 = Type::union_of(vec![u1.clone(), T_STRING]);
    let bounds = u2.bounds().unwrap();
    assert_eq!(bounds.len(), 3);
    assert!(bounds.iter().all(|b| b.bounds().is_none()));

    // unions are unordered: both spellings construct the same type
    assert_eq!(Type::union_of(vec![T_BOOL, T_NULL]), u1);

    // a singular union is no union at all
    assert_eq!(Type::union_of(vec![T_INT, T_INT]), T_INT);
    assert_eq!(Type::union_of(vec![]), T_VOID);
}
