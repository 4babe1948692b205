use graph::{Leaf, Node, Type, T_VOID, T_ANY};
use subtype::is_subtype;

/// The union of two types. The result is canonical: nested unions are
/// flattened, subsumed bounds pruned, and a singular union unwrapped.
pub fn union(t1: &Type, t2: &Type) -> Type {
    trace!("calculating {:?} | {:?}", t1, t2);
    Type::union_of(vec![t1.clone(), t2.clone()])
}

/// The union of arbitrarily many types; `void` when there are none.
pub fn union_all(bounds: Vec<Type>) -> Type {
    Type::union_of(bounds)
}

/// The least upper bound of two types.
pub fn least_upper_bound(t1: &Type, t2: &Type) -> Type {
    union(t1, t2)
}

/// The negation of a type: `!any` is `void`, `!void` is `any`, a double
/// negation cancels, and anything else becomes a negation node.
pub fn negation(t: &Type) -> Type {
    trace!("calculating !{:?}", t);
    match *t {
        Type::Leaf(Leaf::Any) => return T_VOID,
        Type::Leaf(Leaf::Void) => return T_ANY,
        Type::Compound(ref c) => {
            if let Node::Negation(e) = c.nodes()[0] {
                return t.extract(e);
            }
        }
        Type::Leaf(_) => {}
    }
    Type::negation(t.clone())
}

// the root constructor of a compound, used to decide structural disjointness
#[derive(Copy, Clone, PartialEq, Eq)]
enum Shape {
    Set, List, Reference, Process, Dictionary, Tuple, Record, Function, Opaque,
}

fn shape(t: &Type) -> Option<Shape> {
    match *t {
        Type::Leaf(_) => None,
        Type::Compound(ref c) => Some(match c.nodes()[0] {
            Node::Set(_) => Shape::Set,
            Node::List(_) => Shape::List,
            Node::Reference(_) => Shape::Reference,
            Node::Process(_) => Shape::Process,
            Node::Dictionary(..) => Shape::Dictionary,
            Node::Tuple(_) => Shape::Tuple,
            Node::Record(..) => Shape::Record,
            Node::Function(_) | Node::Method(..) => Shape::Function,
            Node::Union(_) | Node::Intersection(_) | Node::Negation(_) |
            Node::Nominal(_) | Node::Label(_) | Node::Leaf(_) => Shape::Opaque,
        }),
    }
}

/// The intersection of two types.
///
/// Comparable types shortcut to the smaller one and unions distribute, so the
/// common cases (flow typing over unions of records, primitives) produce the
/// expected small result. Structurally disjoint constructors collapse to
/// `void`. Only the remainder falls back to De Morgan,
/// `!(!t1 | !t2)`, which is sound but opaque to further simplification.
pub fn intersect(t1: &Type, t2: &Type) -> Type {
    trace!("calculating {:?} & {:?}", t1, t2);

    if is_subtype(t1, t2) { return t2.clone(); }
    if is_subtype(t2, t1) { return t1.clone(); }

    // distribute over unions on either side
    if matches_union(t1) {
        let bounds = t1.bounds().expect("union without bounds");
        return union_all(bounds.iter().map(|b| intersect(b, t2)).collect());
    }
    if matches_union(t2) {
        let bounds = t2.bounds().expect("union without bounds");
        return union_all(bounds.iter().map(|b| intersect(t1, b)).collect());
    }

    // two leaves which are not related (checked above) share no values;
    // likewise a leaf against a structural constructor, or two different
    // structural constructors
    let (s1, s2) = (shape(t1), shape(t2));
    match (s1, s2) {
        (None, None) => return T_VOID,
        (None, Some(s)) | (Some(s), None) if s != Shape::Opaque => return T_VOID,
        (Some(a), Some(b)) if a != Shape::Opaque && b != Shape::Opaque && a != b => {
            return T_VOID;
        }
        (_, _) => {}
    }

    // matching covariant constructors intersect componentwise
    match (s1, s2) {
        (Some(Shape::Set), Some(Shape::Set)) => {
            return Type::set(intersect(&t1.element().expect("set"), &t2.element().expect("set")));
        }
        (Some(Shape::List), Some(Shape::List)) => {
            return Type::list(intersect(&t1.element().expect("list"),
                                        &t2.element().expect("list")));
        }
        (Some(Shape::Dictionary), Some(Shape::Dictionary)) => {
            return Type::dictionary(intersect(&t1.key().expect("dict"), &t2.key().expect("dict")),
                                    intersect(&t1.value().expect("dict"),
                                              &t2.value().expect("dict")));
        }
        (Some(Shape::Tuple), Some(Shape::Tuple)) => {
            let es1 = t1.tuple_elements().expect("tuple");
            let es2 = t2.tuple_elements().expect("tuple");
            if es1.len() != es2.len() {
                return T_VOID;
            }
            return Type::tuple(es1.iter().zip(es2.iter()).map(|(a, b)| intersect(a, b)).collect());
        }
        (Some(Shape::Record), Some(Shape::Record)) => {
            if !t1.is_open_record() && !t2.is_open_record() {
                let fs1 = t1.fields().expect("record");
                let fs2 = t2.fields().expect("record");
                let names_match = fs1.len() == fs2.len() &&
                    fs1.iter().zip(fs2.iter()).all(|(a, b)| a.0 == b.0);
                if !names_match {
                    return T_VOID;
                }
                return Type::record(false,
                                    fs1.iter()
                                       .zip(fs2.iter())
                                       .map(|(&(ref n, ref a), &(_, ref b))| {
                                           (n.clone(), intersect(a, b))
                                       })
                                       .collect());
            }
        }
        (_, _) => {}
    }

    // the remainder (negations, nominals, open records, functions) goes
    // through De Morgan
    negation(&union(&negation(t1), &negation(t2)))
}

fn matches_union(t: &Type) -> bool {
    match *t {
        Type::Compound(ref c) => match c.nodes()[0] {
            Node::Union(_) => true,
            _ => false,
        },
        Type::Leaf(_) => false,
    }
}

/// The greatest lower bound of two types.
pub fn greatest_lower_bound(t1: &Type, t2: &Type) -> Type {
    intersect(t1, t2)
}

/// The least type covering every value of `t1` which is not a value of `t2`.
/// This is sound but not complete: the result may cover spurious values when
/// the difference has no exact structural representation. It backs the flow
/// typing of a successful runtime type test.
pub fn least_difference(t1: &Type, t2: &Type) -> Type {
    trace!("calculating {:?} - {:?}", t1, t2);

    if is_subtype(t2, t1) {
        // every value of t1 is already in t2
        return T_VOID;
    }
    if let Some(bounds) = t1.bounds() {
        if matches_union(t1) {
            let kept: Vec<Type> = bounds.into_iter().filter(|b| !is_subtype(t2, b)).collect();
            return union_all(kept);
        }
    }
    t1.clone()
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
mod tests {
    use graph::*;
    use subtype::is_subtype;
    use super::*;

    #[test]
    fn test_lub_bounds() {
        let samples = [T_INT, T_NULL, Type::list(T_INT),
                       Type::union_of(vec![T_BOOL, T_NULL])];
        for a in &samples {
            for b in &samples {
                let lub = least_upper_bound(a, b);
                assert!(is_subtype(&lub, a), "{:?} :> {:?}", lub, a);
                assert!(is_subtype(&lub, b), "{:?} :> {:?}", lub, b);
            }
        }
    }

    #[test]
    fn test_glb_bounds() {
        let samples = [T_INT, T_REAL, T_NULL, Type::list(T_INT), Type::list(T_REAL),
                       Type::union_of(vec![T_INT, T_NULL])];
        for a in &samples {
            for b in &samples {
                let glb = greatest_lower_bound(a, b);
                assert!(is_subtype(a, &glb), "{:?} :> {:?}", a, glb);
                assert!(is_subtype(b, &glb), "{:?} :> {:?}", b, glb);
            }
        }
    }

    #[test]
    fn test_glb_shapes() {
        assert_eq!(greatest_lower_bound(&T_INT, &T_REAL), T_INT);
        assert_eq!(greatest_lower_bound(&T_INT, &T_NULL), T_VOID);
        assert_eq!(greatest_lower_bound(&Type::union_of(vec![T_INT, T_NULL]), &T_NULL), T_NULL);
        assert_eq!(greatest_lower_bound(&Type::list(T_INT), &Type::set(T_INT)), T_VOID);
        assert_eq!(greatest_lower_bound(&Type::list(T_INT), &Type::list(T_REAL)),
                   Type::list(T_INT));
    }

    #[test]
    fn test_negation() {
        assert_eq!(negation(&T_ANY), T_VOID);
        assert_eq!(negation(&T_VOID), T_ANY);
        assert_eq!(negation(&negation(&T_INT)), T_INT);
        assert_eq!(negation(&negation(&Type::list(T_BOOL))), Type::list(T_BOOL));
    }

    #[test]
    fn test_least_difference() {
        let int_or_null = Type::union_of(vec![T_INT, T_NULL]);
        assert_eq!(least_difference(&int_or_null, &T_NULL), T_INT);
        assert_eq!(least_difference(&int_or_null, &int_or_null), T_VOID);
        assert_eq!(least_difference(&T_INT, &T_INT), T_VOID);
        // over-approximation: a non-union minuend is returned unchanged
        assert_eq!(least_difference(&T_REAL, &T_INT), T_REAL);

        // flow typing over a recursive type: stripping null leaves the record
        let fields = vec![("data".into(), T_INT), ("next".into(), Type::label("X"))];
        let tmp = Type::union_of(vec![T_NULL, Type::record(false, fields)]);
        let list = Type::recursive(&"X".into(), &tmp).unwrap();
        let nonempty = least_difference(&list, &T_NULL);
        assert!(nonempty.fields().is_some());
        assert_eq!(nonempty.field(&"next".into()), Some(list));
    }
}
