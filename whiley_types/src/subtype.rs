use graph::{components, Leaf, Node, Type};

/// The complete subtype relation over the nodes of one type graph.
///
/// The matrix is in row-major order and `is(i, j)` states that node `i` is a
/// subtype of node `j`. It is computed by a monotonic fixed point: initially
/// every relationship is assumed to hold, then every pair is re-checked
/// against the current matrix until nothing changes. Since re-checking can
/// only clear bits, termination is guaranteed.
pub struct SubtypeMatrix {
    size: usize,
    bits: Vec<bool>,
}

impl SubtypeMatrix {
    /// Whether node `i` is a subtype of node `j`.
    pub fn is(&self, i: usize, j: usize) -> bool {
        self.bits[i * self.size + j]
    }

    fn set(&mut self, i: usize, j: usize, v: bool) {
        self.bits[i * self.size + j] = v;
    }

    /// Whether nodes `i` and `j` are mutual subtypes, i.e. equivalent.
    pub fn equivalent(&self, i: usize, j: usize) -> bool {
        self.is(i, j) && self.is(j, i)
    }
}

pub fn build_subtype_matrix(nodes: &[Node]) -> SubtypeMatrix {
    let size = nodes.len();
    let mut matrix = SubtypeMatrix { size: size, bits: vec![true; size * size] };

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..size {
            for j in 0..size {
                let isj = node_is_subtype(i, j, nodes, &matrix);
                if matrix.is(i, j) != isj {
                    matrix.set(i, j, isj);
                    changed = true;
                }
            }
        }
    }

    matrix
}

/// A single step of the local check: decides `n1 <: n2` assuming the current
/// matrix for all child relationships.
fn node_is_subtype(n1: usize, n2: usize, nodes: &[Node], m: &SubtypeMatrix) -> bool {
    match (&nodes[n1], &nodes[n2]) {
        (&Node::Label(_), _) | (_, &Node::Label(_)) => {
            panic!("type algebra applied to an open type");
        }

        // identical leaves, and the two primitive coercions
        (&Node::Leaf(l1), &Node::Leaf(l2)) if l1 == l2 => true,
        (&Node::Leaf(Leaf::Void), _) => true,
        (_, &Node::Leaf(Leaf::Any)) => true,
        (&Node::Leaf(Leaf::Int), &Node::Leaf(Leaf::Real)) => true,

        // unary constructors are covariant
        (&Node::Set(e1), &Node::Set(e2)) |
        (&Node::List(e1), &Node::List(e2)) |
        (&Node::Reference(e1), &Node::Reference(e2)) |
        (&Node::Process(e1), &Node::Process(e2)) => m.is(e1, e2),

        // negation is antitone
        (&Node::Negation(e1), &Node::Negation(e2)) => m.is(e2, e1),

        (&Node::Dictionary(k1, v1), &Node::Dictionary(k2, v2)) => {
            m.is(k1, k2) && m.is(v1, v2)
        }

        (&Node::Tuple(ref es1), &Node::Tuple(ref es2)) => {
            es1.len() == es2.len() &&
                es1.iter().zip(es2.iter()).all(|(&e1, &e2)| m.is(e1, e2))
        }

        // the return is covariant, the parameters are contravariant
        (&Node::Function(ref es1), &Node::Function(ref es2)) => {
            es1.len() == es2.len() && m.is(es1[0], es2[0]) &&
                es1[1..].iter().zip(es2[1..].iter()).all(|(&p1, &p2)| m.is(p2, p1))
        }

        // as functions, with the receiver also contravariant
        (&Node::Method(recv1, ref es1), &Node::Method(recv2, ref es2)) => {
            let recv_ok = match (recv1, recv2) {
                (None, None) => true,
                (Some(r1), Some(r2)) => m.is(r2, r1),
                (_, _) => false,
            };
            recv_ok && es1.len() == es2.len() && m.is(es1[0], es2[0]) &&
                es1[1..].iter().zip(es2[1..].iter()).all(|(&p1, &p2)| m.is(p2, p1))
        }

        // a closed record admits exactly its own fields; an open record
        // admits any record that has at least the named fields
        (&Node::Record(open1, ref fs1), &Node::Record(open2, ref fs2)) => {
            if open2 {
                fs2.iter().all(|&(ref name2, e2)| {
                    fs1.iter().any(|&(ref name1, e1)| name1 == name2 && m.is(e1, e2))
                })
            } else if open1 || fs1.len() != fs2.len() {
                false
            } else {
                fs1.iter().zip(fs2.iter()).all(|(&(ref name1, e1), &(ref name2, e2))| {
                    name1 == name2 && m.is(e1, e2)
                })
            }
        }

        // every bound of the smaller union is under some bound of the larger
        (&Node::Union(ref bs1), &Node::Union(ref bs2)) => {
            bs1.iter().all(|&b1| bs2.iter().any(|&b2| m.is(b1, b2)))
        }
        (&Node::Union(ref bs1), _) => bs1.iter().all(|&b1| m.is(b1, n2)),
        (_, &Node::Union(ref bs2)) => bs2.iter().any(|&b2| m.is(n1, b2)),

        // sound approximations; the algebra normalises intersections away,
        // so these only matter for programmatically constructed types
        (&Node::Intersection(ref bs1), &Node::Intersection(ref bs2)) => {
            bs2.iter().all(|&b2| bs1.iter().any(|&b1| m.is(b1, b2)))
        }
        (&Node::Intersection(ref bs1), _) => bs1.iter().any(|&b1| m.is(b1, n2)),
        (_, &Node::Intersection(ref bs2)) => bs2.iter().all(|&b2| m.is(n1, b2)),

        // nominal placeholders are opaque
        (&Node::Nominal(ref a), &Node::Nominal(ref b)) => a == b,

        (_, _) => false,
    }
}

/// Decides `t1 :> t2`, i.e. whether every possible value of `t2` is also a
/// value of `t1`. The decision runs the fixed point over the concatenation
/// of the two node arrays.
pub fn is_subtype(t1: &Type, t2: &Type) -> bool {
    trace!("deciding {:?} :> {:?}", t1, t2);
    assert!(!t1.contains_label() && !t2.contains_label(),
            "subtype applied to an open type");

    let mut nodes = components(t1).into_owned();
    let offset = nodes.len();
    for node in components(t2).iter() {
        nodes.push(node.map_children(|c| c + offset));
    }

    let matrix = build_subtype_matrix(&nodes);
    matrix.is(offset, 0)
}

// ---------------------------------------------------------------------------
// tests
