use graph::{components, construct, Leaf, Node, Type};
use subtype::{build_subtype_matrix, SubtypeMatrix};

/// Produces the fully minimised form of a type: equivalence classes of nodes
/// (under mutual subtyping) are merged, subsumed union bounds are pruned,
/// singular unions are unwrapped, and everything unreachable from the root is
/// dropped. The result is structurally canonical, so equal sets of values
/// get equal node arrays.
pub fn minimise(t: &Type) -> Type {
    // leaf types never need minimising
    if let Type::Leaf(_) = *t {
        return t.clone();
    }
    assert!(!t.contains_label(), "minimise applied to an open type");

    let nodes = components(t);
    let matrix = build_subtype_matrix(&nodes);

    let mut out = Vec::new();
    let mut allocated = vec![0; nodes.len()];
    rebuild(0, &nodes, &mut allocated, &mut out, &matrix);
    construct(out.into_iter().map(|n| n.expect("unfilled node during minimise")).collect())
}

/// Emits the equivalence class of `idx` into `out` (unless already emitted)
/// and returns its new index. `allocated` stores new indices shifted by one,
/// zero meaning not yet allocated; the class is claimed *before* children are
/// rebuilt so that cycles terminate.
fn rebuild(idx: usize, nodes: &[Node], allocated: &mut Vec<usize>,
           out: &mut Vec<Option<Node>>, m: &SubtypeMatrix) -> usize {
    if allocated[idx] > 0 {
        return allocated[idx] - 1;
    }

    let cidx = out.len();
    for i in 0..nodes.len() {
        if m.equivalent(i, idx) {
            allocated[i] = cidx + 1;
        }
    }
    out.push(None); // reserve space for this node

    let newnode = match nodes[idx] {
        Node::Leaf(l) => Node::Leaf(l),
        Node::Nominal(ref name) => Node::Nominal(name.clone()),
        Node::Label(_) => panic!("minimise applied to an open type"),

        Node::Set(e) => Node::Set(rebuild(e, nodes, allocated, out, m)),
        Node::List(e) => Node::List(rebuild(e, nodes, allocated, out, m)),
        Node::Reference(e) => Node::Reference(rebuild(e, nodes, allocated, out, m)),
        Node::Process(e) => Node::Process(rebuild(e, nodes, allocated, out, m)),
        Node::Negation(e) => Node::Negation(rebuild(e, nodes, allocated, out, m)),

        Node::Dictionary(k, v) => {
            let k = rebuild(k, nodes, allocated, out, m);
            let v = rebuild(v, nodes, allocated, out, m);
            Node::Dictionary(k, v)
        }

        Node::Tuple(ref es) => {
            Node::Tuple(es.iter().map(|&e| rebuild(e, nodes, allocated, out, m)).collect())
        }
        Node::Function(ref es) => {
            Node::Function(es.iter().map(|&e| rebuild(e, nodes, allocated, out, m)).collect())
        }
        Node::Method(recv, ref es) => {
            let recv = recv.map(|r| rebuild(r, nodes, allocated, out, m));
            Node::Method(recv, es.iter().map(|&e| rebuild(e, nodes, allocated, out, m)).collect())
        }
        Node::Intersection(ref es) => {
            Node::Intersection(es.iter().map(|&e| rebuild(e, nodes, allocated, out, m)).collect())
        }

        Node::Record(open, ref fields) => {
            Node::Record(open,
                         fields.iter()
                               .map(|&(ref n, e)| (n.clone(), rebuild(e, nodes, allocated, out, m)))
                               .collect())
        }

        Node::Union(ref es) => {
            // a bound which is the union itself contributes nothing to the
            // fixed point (X = X|T solves to X = T), so drop self edges first
            let es: Vec<usize> = es.iter().cloned().filter(|&b| b != idx).collect();
            if es.is_empty() {
                // X = X has only the empty solution
                out[cidx] = Some(Node::Leaf(Leaf::Void));
                return cidx;
            }

            // drop any bound subsumed by another bound; on a mutual
            // subsumption the earlier bound wins, so at least one survives
            let mut removed = vec![false; es.len()];
            for i in 0..es.len() {
                for j in 0..es.len() {
                    if i == j { continue; }
                    if m.is(es[j], es[i]) && (!m.is(es[i], es[j]) || i < j) {
                        removed[j] = true;
                    }
                }
            }
            let kept: Vec<usize> = es.iter().cloned()
                                     .zip(removed.iter())
                                     .filter(|&(_, &r)| !r)
                                     .map(|(e, _)| e)
                                     .collect();

            if kept.len() == 1 {
                // the union node is entirely subsumed by one bound; undo the
                // allocation made above and continue from the bound instead
                out.pop();
                for i in 0..nodes.len() {
                    if m.equivalent(i, idx) {
                        allocated[i] = 0;
                    }
                }
                return rebuild(kept[0], nodes, allocated, out, m);
            }

            Node::Union(kept.iter().map(|&e| rebuild(e, nodes, allocated, out, m)).collect())
        }
    };

    out[cidx] = Some(newnode);
    cidx
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
mod tests {
    use graph::*;
    use super::minimise;

    #[test]
    fn test_minimise_idempotent() {
        let samples = vec![
            T_INT,
            Type::list(T_INT),
            Type::union_of(vec![T_INT, T_NULL]),
            Type::record(false, vec![("x".into(), T_INT), ("y".into(), T_REAL)]),
            {
                let fields = vec![("next".into(), Type::label("X"))];
                let tmp = Type::union_of(vec![T_NULL, Type::record(false, fields)]);
                Type::recursive(&"X".into(), &tmp).unwrap()
            },
        ];
        for t in samples {
            let once = minimise(&t);
            let twice = minimise(&once);
            assert_eq!(once, twice, "minimise not idempotent for {:?}", t);
            // constructors canonicalise already, so the first pass is a no-op too
            assert_eq!(once, t);
        }
    }

    #[test]
    fn test_union_subsumption() {
        // int is subsumed by real
        assert_eq!(Type::union_of(vec![T_INT, T_REAL]), T_REAL);
        // anything is subsumed by any
        assert_eq!(Type::union_of(vec![T_INT, T_ANY, T_NULL]), T_ANY);
        // void adds nothing to a union
        assert_eq!(Type::union_of(vec![T_VOID, T_BOOL]), T_BOOL);
        // [int]|[real] collapses to [real]
        assert_eq!(Type::union_of(vec![Type::list(T_INT), Type::list(T_REAL)]),
                   Type::list(T_REAL));
    }

    #[test]
    fn test_duplicate_node_merging() {
        // both fields point at equivalent [int] nodes which must be shared
        let t = Type::record(false, vec![("a".into(), Type::list(T_INT)),
                                         ("b".into(), Type::list(T_INT))]);
        if let Type::Compound(ref c) = t {
            // root + one list + one int
            assert_eq!(c.nodes().len(), 3);
        } else {
            panic!("record did not stay compound");
        }
        assert_eq!(t.field(&"a".into()), t.field(&"b".into()));
    }
}
