use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use vec_map::VecMap;
use whiley_env::Span;
use code::{Code, Label};

/// The slot holding the value a constraint block checks.
pub const THIS_SLOT: usize = 0;

static LABEL_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Returns a globally unique label.
pub fn fresh_label() -> Label {
    let n = LABEL_COUNT.fetch_add(1, Ordering::Relaxed);
    format!("blklab{}", n)
}

/// One operation paired with its positional attributes: the source span it
/// was lowered from and an optional comment.
#[derive(Clone, PartialEq, Debug)]
pub struct Entry {
    pub code: Code,
    pub span: Span,
    pub comment: Option<String>,
}

/// An ordered sequence of IL operations, with the number of input slots the
/// sequence consumes. Temporaries may use slots past the declared inputs.
#[derive(Clone, PartialEq, Debug)]
pub struct Block {
    ninputs: usize,
    entries: Vec<Entry>,
}

impl Block {
    pub fn new(ninputs: usize) -> Block {
        Block { ninputs: ninputs, entries: Vec::new() }
    }

    pub fn num_inputs(&self) -> usize {
        self.ninputs
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn append<S: Into<Span>>(&mut self, code: Code, span: S) {
        self.entries.push(Entry { code: code, span: span.into(), comment: None });
    }

    pub fn append_commented<S: Into<Span>>(&mut self, code: Code, span: S, comment: String) {
        self.entries.push(Entry { code: code, span: span.into(), comment: Some(comment) });
    }

    /// Appends all entries of another block verbatim.
    pub fn extend(&mut self, other: Block) {
        self.entries.extend(other.entries);
    }

    /// One past the maximum slot index mentioned anywhere in the block, and
    /// at least the declared number of inputs.
    pub fn num_slots(&self) -> usize {
        let mut max = self.ninputs;
        for entry in &self.entries {
            entry.code.remap_slots(|s| {
                if s + 1 > max { max = s + 1; }
                s
            });
        }
        max
    }

    /// Shifts every slot up by `amount`, so a block consuming slots `[0, n)`
    /// consumes `[amount, amount+n)` afterwards. Shifting by zero is the
    /// identity; labels are left untouched.
    pub fn shift(&self, amount: usize) -> Block {
        let entries = self.entries.iter().map(|entry| {
            Entry {
                code: entry.code.remap_slots(|s| s + amount),
                span: entry.span,
                comment: entry.comment.clone(),
            }
        }).collect();
        Block { ninputs: self.ninputs, entries: entries }
    }

    /// Renames every label *defined* inside this block (and all its uses) to
    /// a globally fresh one, leaving external targets alone. Repeated
    /// embedding of the same block therefore cannot collide.
    pub fn relabel(&self) -> Block {
        let mut map = HashMap::new();
        for entry in &self.entries {
            if let Some(l) = entry.code.defined_label() {
                if !map.contains_key(l) {
                    map.insert(l.clone(), fresh_label());
                }
            }
        }

        let entries = self.entries.iter().map(|entry| {
            Entry {
                code: entry.code.map_labels(|l| map.get(l).cloned().unwrap_or_else(|| l.clone())),
                span: entry.span,
                comment: entry.comment.clone(),
            }
        }).collect();
        Block { ninputs: self.ninputs, entries: entries }
    }

    /// Rewrites every `Fail` into a `Goto` to the given label, then relabels.
    /// A union type constraint uses this so that one failing alternative
    /// merely falls through to the next.
    pub fn chain(&self, target: &Label) -> Block {
        let entries = self.entries.iter().map(|entry| {
            let code = match entry.code {
                Code::Fail(_) => Code::Goto(target.clone()),
                ref code => code.clone(),
            };
            Entry { code: code, span: entry.span, comment: entry.comment.clone() }
        }).collect();
        (Block { ninputs: self.ninputs, entries: entries }).relabel()
    }

    /// Embeds an external block, remapping its slots through `binding`.
    /// Unbound slots land past every slot this block uses, and the embedded
    /// labels are freshened.
    pub fn import_external(&mut self, other: &Block, binding: &VecMap<usize>) {
        trace!("importing a block of {} entries with binding {:?}",
               other.entries.len(), binding);
        let mut base = self.num_slots();
        for (_, &target) in binding.iter() {
            if target + 1 > base { base = target + 1; }
        }

        let imported = other.relabel();
        for entry in &imported.entries {
            let code = entry.code.remap_slots(|s| {
                binding.get(s).cloned().unwrap_or(base + s)
            });
            self.entries.push(Entry {
                code: code,
                span: entry.span,
                comment: entry.comment.clone(),
            });
        }
    }

    /// Checks the structural invariants: no label is defined twice, and every
    /// branch targets a label defined in this block.
    pub fn validate(&self) -> Result<(), String> {
        let mut defined = HashSet::new();
        for entry in &self.entries {
            if let Code::Label(ref l) = entry.code {
                if !defined.insert(l.clone()) {
                    return Err(format!("label {} defined twice", l));
                }
            }
        }
        let mut ends = HashSet::new();
        for entry in &self.entries {
            if let Code::End(ref l) = entry.code {
                if !ends.insert(l.clone()) {
                    return Err(format!("loop end {} defined twice", l));
                }
                defined.insert(l.clone());
            }
        }
        for entry in &self.entries {
            for target in entry.code.target_labels() {
                if !defined.contains(target) {
                    return Err(format!("branch to unknown label {}", target));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
mod tests {
    use whiley_env::Span;
    use whiley_types::T_INT;
    use code::{Code, COp, Label};
    use value::Value;
    use super::{Block, fresh_label};

    fn sample_constraint() -> Block {
        // load slot 0, compare against zero, fail unless non-negative
        let ok = fresh_label();
        let mut blk = Block::new(1);
        blk.append(Code::Load(0), Span::dummy());
        blk.append(Code::Const(Value::int(0)), Span::dummy());
        blk.append(Code::IfGoto(COp::GtEq, ok.clone()), Span::dummy());
        blk.append(Code::Fail("constraint not satisfied".into()), Span::dummy());
        blk.append(Code::Label(ok), Span::dummy());
        blk
    }

    #[test]
    fn test_shift() {
        let blk = sample_constraint();
        assert_eq!(blk.num_slots(), 1);
        assert_eq!(blk.shift(0), blk);

        let shifted = blk.shift(3);
        assert_eq!(shifted.num_slots(), 4);
        assert_eq!(shifted.entries()[0].code, Code::Load(3));
        // shifting back down is not provided; shifting twice accumulates
        assert_eq!(shifted.shift(2).entries()[0].code, Code::Load(5));
    }

    #[test]
    fn test_relabel_preserves_shape() {
        let blk = sample_constraint();
        let once = blk.relabel();
        let twice = once.relabel();
        assert!(once.validate().is_ok());
        assert!(twice.validate().is_ok());

        // the label names differ but the label *structure* does not
        fn shape(blk: &Block) -> Vec<String> {
            let mut order: Vec<Label> = Vec::new();
            blk.entries().iter().map(|e| {
                let code = e.code.map_labels(|l| {
                    if !order.contains(l) { order.push(l.clone()); }
                    format!("L{}", order.iter().position(|x| x == l).unwrap())
                });
                format!("{:?}", code)
            }).collect()
        }
        assert_eq!(shape(&blk), shape(&once));
        assert_eq!(shape(&once), shape(&twice));
        assert!(once.entries()[2].code != blk.entries()[2].code);
    }

    #[test]
    fn test_chain_rewrites_fail() {
        let blk = sample_constraint();
        let next: Label = "next".into();
        let chained = blk.chain(&next);
        assert_eq!(chained.entries()[3].code, Code::Goto("next".into()));
        // the internal label was freshened, the external target was not
        assert!(chained.entries()[4].code != blk.entries()[4].code);
    }

    #[test]
    fn test_import_external_binding() {
        use vec_map::VecMap;

        let constraint = sample_constraint();
        let mut blk = Block::new(2);
        blk.append(Code::Load(1), Span::dummy());
        blk.append(Code::Store(4), Span::dummy());

        let mut binding = VecMap::new();
        binding.insert(0, 1);
        blk.import_external(&constraint, &binding);

        // slot 0 of the constraint became slot 1; nothing else collides
        assert_eq!(blk.entries()[2].code, Code::Load(1));
        assert!(blk.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_target() {
        let mut blk = Block::new(0);
        blk.append(Code::Goto("nowhere".into()), Span::dummy());
        assert!(blk.validate().is_err());

        let mut blk = Block::new(0);
        let l: Label = "dup".into();
        blk.append(Code::Label(l.clone()), Span::dummy());
        blk.append(Code::Label(l), Span::dummy());
        assert!(blk.validate().is_err());
    }

    #[test]
    fn test_convert_type_payload() {
        let mut blk = Block::new(0);
        blk.append(Code::Convert(T_INT), Span::dummy());
        assert_eq!(blk.entries()[0].code, Code::Convert(T_INT));
    }
}
