use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;
use num_rational::BigRational;
use whiley_env::{Name, NameId};
use whiley_types as types;
use whiley_types::{Type, T_NULL, T_BOOL, T_BYTE, T_CHAR, T_INT, T_REAL, T_STRING, T_ANY};

/// A constant value, as it appears in constant declarations and `Const` codes.
///
/// Values are totally ordered so that sets and dictionaries have a canonical
/// representation and value equality is structural.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Char(char),
    /// An unbounded integer.
    Int(BigInt),
    /// An unbounded rational.
    Real(BigRational),
    Strung(String),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Tuple(Vec<Value>),
    Dictionary(BTreeMap<Value, Value>),
    Record(BTreeMap<Name, Value>),
    /// A reference to a named function, with its type if declared explicitly.
    FunConst(NameId, Option<Type>),
}

impl Value {
    pub fn int<I: Into<BigInt>>(i: I) -> Value {
        Value::Int(i.into())
    }

    pub fn rational<I: Into<BigInt>>(numer: I, denom: I) -> Value {
        Value::Real(BigRational::new(numer.into(), denom.into()))
    }

    pub fn strung(s: &str) -> Value {
        Value::Strung(s.to_string())
    }

    /// The most precise structural type of this value. Element types of
    /// aggregates are least upper bounds, so the empty list is `[void]`.
    pub fn ty(&self) -> Type {
        match *self {
            Value::Null => T_NULL,
            Value::Bool(_) => T_BOOL,
            Value::Byte(_) => T_BYTE,
            Value::Char(_) => T_CHAR,
            Value::Int(_) => T_INT,
            Value::Real(_) => T_REAL,
            Value::Strung(_) => T_STRING,
            Value::List(ref vs) => {
                Type::list(types::union_all(vs.iter().map(|v| v.ty()).collect()))
            }
            Value::Set(ref vs) => {
                Type::set(types::union_all(vs.iter().map(|v| v.ty()).collect()))
            }
            Value::Tuple(ref vs) => {
                Type::tuple(vs.iter().map(|v| v.ty()).collect())
            }
            Value::Dictionary(ref kvs) => {
                Type::dictionary(types::union_all(kvs.keys().map(|v| v.ty()).collect()),
                                 types::union_all(kvs.values().map(|v| v.ty()).collect()))
            }
            Value::Record(ref fields) => {
                Type::record(false,
                             fields.iter().map(|(n, v)| (n.clone(), v.ty())).collect())
            }
            Value::FunConst(_, Some(ref t)) => t.clone(),
            Value::FunConst(_, None) => T_ANY,
        }
    }
}

// ---------------------------------------------------------------------------
// tests

#[test]
fn test_value_types() {
    use whiley_types::T_VOID;

    assert_eq!(Value::int(42).ty(), T_INT);
    assert_eq!(Value::rational(1, 2).ty(), T_REAL);
    assert_eq!(Value::List(vec![]).ty(), Type::list(T_VOID));
    assert_eq!(Value::List(vec![Value::int(1), Value::Null]).ty(),
               Type::list(types::union(&T_INT, &T_NULL)));

    let mut fields = BTreeMap::new();
    fields.insert("x".into(), Value::int(1));
    fields.insert("y".into(), Value::int(2));
    assert_eq!(Value::Record(fields).ty(),
               Type::record(false, vec![("x".into(), T_INT), ("y".into(), T_INT)]));
}

#[test]
fn test_value_ordering_canonical() {
    let mut s1 = BTreeSet::new();
    s1.insert(Value::int(2));
    s1.insert(Value::int(1));
    let mut s2 = BTreeSet::new();
    s2.insert(Value::int(1));
    s2.insert(Value::int(2));
    assert_eq!(Value::Set(s1), Value::Set(s2));
}
