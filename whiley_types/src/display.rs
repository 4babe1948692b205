use std::fmt;

use graph::{Leaf, Node, Type};

fn leaf_name(leaf: Leaf) -> &'static str {
    match leaf {
        Leaf::Void => "void",
        Leaf::Any => "any",
        Leaf::Null => "null",
        Leaf::Bool => "bool",
        Leaf::Byte => "byte",
        Leaf::Char => "char",
        Leaf::Int => "int",
        Leaf::Real => "real",
        Leaf::Strung => "string",
    }
}

// loop headers get recursive-type names in this order, with a numeric suffix
// once the alphabet runs out
const HEADER_NAMES: &'static [u8] = b"XYZUVWLMNOPQRST";

fn header_title(count: usize) -> String {
    let c = HEADER_NAMES[count % HEADER_NAMES.len()] as char;
    let n = count / HEADER_NAMES.len();
    if n > 0 {
        format!("{}{}", c, n)
    } else {
        c.to_string()
    }
}

// a DFS marking every node which is the target of a back edge; those become
// the `X<...>` headers of the textual form
fn find_headers(idx: usize, nodes: &[Node], visited: &mut Vec<bool>,
                onstack: &mut Vec<bool>, headers: &mut Vec<bool>) {
    if visited[idx] {
        if onstack[idx] {
            headers[idx] = true;
        }
        return;
    }
    visited[idx] = true;
    onstack[idx] = true;
    let mut children = Vec::new();
    nodes[idx].for_each_child(|c| children.push(c));
    for c in children {
        find_headers(c, nodes, visited, onstack, headers);
    }
    onstack[idx] = false;
}

// prints the graph rooted at `idx`; shared non-header nodes are expanded
// rather than aliased, since aliasing cannot be written down textually
fn fmt_node(idx: usize, nodes: &[Node], visited: &mut Vec<bool>,
            titles: &[Option<String>], f: &mut fmt::Formatter) -> fmt::Result {
    if visited[idx] {
        // a back edge; by construction the target carries a title
        return write!(f, "{}", titles[idx].as_ref().map_or("?", |t| &t[..]));
    }
    if titles[idx].is_some() {
        visited[idx] = true;
    }

    if let Some(ref title) = titles[idx] {
        write!(f, "{}<", title)?;
    }

    match nodes[idx] {
        Node::Leaf(l) => write!(f, "{}", leaf_name(l))?,
        Node::Set(e) => {
            write!(f, "{{")?;
            fmt_node(e, nodes, visited, titles, f)?;
            write!(f, "}}")?;
        }
        Node::List(e) => {
            write!(f, "[")?;
            fmt_node(e, nodes, visited, titles, f)?;
            write!(f, "]")?;
        }
        Node::Reference(e) => {
            write!(f, "*")?;
            fmt_node(e, nodes, visited, titles, f)?;
        }
        Node::Process(e) => {
            write!(f, "process ")?;
            fmt_node(e, nodes, visited, titles, f)?;
        }
        Node::Negation(e) => {
            write!(f, "!")?;
            fmt_node(e, nodes, visited, titles, f)?;
        }
        Node::Dictionary(k, v) => {
            write!(f, "{{")?;
            fmt_node(k, nodes, visited, titles, f)?;
            write!(f, "->")?;
            fmt_node(v, nodes, visited, titles, f)?;
            write!(f, "}}")?;
        }
        Node::Union(ref bounds) => {
            for (i, &b) in bounds.iter().enumerate() {
                if i != 0 { write!(f, "|")?; }
                fmt_node(b, nodes, visited, titles, f)?;
            }
        }
        Node::Intersection(ref bounds) => {
            for (i, &b) in bounds.iter().enumerate() {
                if i != 0 { write!(f, "&")?; }
                fmt_node(b, nodes, visited, titles, f)?;
            }
        }
        Node::Tuple(ref elems) => {
            write!(f, "(")?;
            for (i, &e) in elems.iter().enumerate() {
                if i != 0 { write!(f, ",")?; }
                fmt_node(e, nodes, visited, titles, f)?;
            }
            write!(f, ")")?;
        }
        Node::Function(ref elems) => {
            fmt_node(elems[0], nodes, visited, titles, f)?;
            write!(f, "(")?;
            for (i, &e) in elems[1..].iter().enumerate() {
                if i != 0 { write!(f, ",")?; }
                fmt_node(e, nodes, visited, titles, f)?;
            }
            write!(f, ")")?;
        }
        Node::Method(recv, ref elems) => {
            if let Some(r) = recv {
                fmt_node(r, nodes, visited, titles, f)?;
            }
            write!(f, "::")?;
            fmt_node(elems[0], nodes, visited, titles, f)?;
            write!(f, "(")?;
            for (i, &e) in elems[1..].iter().enumerate() {
                if i != 0 { write!(f, ",")?; }
                fmt_node(e, nodes, visited, titles, f)?;
            }
            write!(f, ")")?;
        }
        Node::Record(open, ref fields) => {
            write!(f, "{{")?;
            for (i, &(ref name, e)) in fields.iter().enumerate() {
                if i != 0 { write!(f, ",")?; }
                fmt_node(e, nodes, visited, titles, f)?;
                write!(f, " {}", name)?;
            }
            if open {
                write!(f, ",...")?;
            }
            write!(f, "}}")?;
        }
        Node::Nominal(ref name) => write!(f, "{}", name)?,
        Node::Label(ref name) => write!(f, "?{}", name)?,
    }

    if titles[idx].is_some() {
        write!(f, ">")?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Type::Leaf(l) => write!(f, "{}", leaf_name(l)),
            Type::Compound(ref c) => {
                let nodes = c.nodes();
                let mut visited = vec![false; nodes.len()];
                let mut onstack = vec![false; nodes.len()];
                let mut headers = vec![false; nodes.len()];
                find_headers(0, nodes, &mut visited, &mut onstack, &mut headers);

                let mut count = 0;
                let titles: Vec<Option<String>> = headers.iter().map(|&h| {
                    if h {
                        let t = header_title(count);
                        count += 1;
                        Some(t)
                    } else {
                        None
                    }
                }).collect();

                for v in &mut visited { *v = false; }
                fmt_node(0, nodes, &mut visited, &titles, f)
            }
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
mod tests {
    use graph::*;

    #[test]
    fn test_display_simple() {
        assert_eq!(format!("{}", T_INT), "int");
        assert_eq!(format!("{}", Type::list(T_INT)), "[int]");
        assert_eq!(format!("{}", Type::set(T_REAL)), "{real}");
        assert_eq!(format!("{}", Type::dictionary(T_INT, T_STRING)), "{int->string}");
        assert_eq!(format!("{}", Type::union_of(vec![T_NULL, T_BOOL])), "null|bool");
        assert_eq!(format!("{}", Type::tuple(vec![T_INT, T_INT])), "(int,int)");
        assert_eq!(format!("{}", Type::function(T_REAL, vec![T_INT])), "real(int)");
        assert_eq!(format!("{}",
                           Type::record(false, vec![("y".into(), T_INT), ("x".into(), T_INT)])),
                   "{int x,int y}");
        assert_eq!(format!("{}", Type::record(true, vec![("x".into(), T_INT)])),
                   "{int x,...}");
    }

    #[test]
    fn test_display_recursive() {
        let fields = vec![("data".into(), T_INT), ("next".into(), Type::label("X"))];
        let tmp = Type::union_of(vec![T_NULL, Type::record(false, fields)]);
        let list = Type::recursive(&"X".into(), &tmp).unwrap();
        assert_eq!(format!("{}", list), "X<null|{int data,X next}>");
    }
}
