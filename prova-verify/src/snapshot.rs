#![forbid(unsafe_code)]

//! `old!` snapshots: copy-on-capture images of state reachable through a `&mut` parameter.

use prova_ast::Span;

use crate::value::SymValue;

/// A place rooted at a local: `pool`, `pool.reserve.amount`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Place {
    pub root: String,
    pub path: Vec<String>,
}

impl Place {
    pub fn display(&self) -> String {
        let mut s = self.root.clone();
        for f in &self.path {
            s.push('.');
            s.push_str(f);
        }
        s
    }

    /// Whether writing through one place may change what the other reads.
    pub fn overlaps(&self, other: &Place) -> bool {
        self.root == other.root && self.path.iter().zip(&other.path).all(|(a, b)| a == b)
    }
}

#[derive(Clone, Debug)]
pub struct StateSnapshot {
    pub name: String,
    pub place: Place,
    /// Number of runtime calls made before the capture.
    pub taken_at: usize,
    pub span: Span,
    value: SymValue,
}

impl StateSnapshot {
    /// Read a field path of the captured image. The empty path is the whole image.
    pub fn read(&self, path: &[String]) -> Option<&SymValue> {
        self.value.at(path)
    }
}

/// Handle to a capture. Names may be shadowed; ids are not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotId(usize);

/// Snapshots taken during one spec function walk.
#[derive(Clone, Debug, Default)]
pub struct SnapshotTable {
    snapshots: Vec<StateSnapshot>,
}

impl SnapshotTable {
    /// Store a deep copy of `current`. Later writes to the source place are not observed.
    pub fn capture(
        &mut self,
        name: impl Into<String>,
        place: Place,
        current: &SymValue,
        taken_at: usize,
        span: Span,
    ) -> SnapshotId {
        self.snapshots.push(StateSnapshot {
            name: name.into(),
            place,
            taken_at,
            span,
            value: current.clone(),
        });
        SnapshotId(self.snapshots.len() - 1)
    }

    pub fn get(&self, id: SnapshotId) -> Option<&StateSnapshot> {
        self.snapshots.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{ArithOp, Sort, Term};
    use crate::unbounded::NumTy;
    use prova_core::IntTy;

    fn u64v(t: Term) -> SymValue {
        SymValue::int(t, NumTy::Fixed(IntTy::U64))
    }

    #[test]
    fn mutation_after_capture_is_not_observed() {
        let mut pool = SymValue::Struct {
            name: "Pool".into(),
            fields: vec![("balance".into(), u64v(Term::var("pool.balance", Sort::Int)))],
        };
        let mut table = SnapshotTable::default();
        let place = Place { root: "pool".into(), path: vec![] };
        let id = table.capture("old_pool", place, &pool, 0, prova_ast::span(0, 0));

        let balance = pool.at_mut(&["balance".to_string()]).unwrap();
        *balance = u64v(Term::arith(ArithOp::Sub, Term::var("pool.balance", Sort::Int), Term::int(1)));

        let snap = table.get(id).unwrap();
        let first = snap.read(&["balance".to_string()]).cloned();
        let second = snap.read(&["balance".to_string()]).cloned();
        assert_eq!(first, Some(u64v(Term::var("pool.balance", Sort::Int))));
        assert_eq!(first, second);
        assert_ne!(snap.read(&[]), Some(&pool));
    }

    #[test]
    fn shadowed_names_keep_distinct_images() {
        let mut table = SnapshotTable::default();
        let place = Place { root: "x".into(), path: vec![] };
        let a = table.capture("s", place.clone(), &u64v(Term::int(1)), 0, prova_ast::span(0, 0));
        let b = table.capture("s", place, &u64v(Term::int(2)), 1, prova_ast::span(0, 0));
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).unwrap().read(&[]), Some(&u64v(Term::int(1))));
        assert_eq!(table.get(b).unwrap().read(&[]), Some(&u64v(Term::int(2))));
        assert_eq!(table.get(b).unwrap().taken_at, 1);
    }

    #[test]
    fn overlapping_places() {
        let a = Place { root: "p".into(), path: vec!["x".into()] };
        let b = Place { root: "p".into(), path: vec![] };
        let c = Place { root: "p".into(), path: vec!["y".into()] };
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.display(), "p.x");
    }
}
