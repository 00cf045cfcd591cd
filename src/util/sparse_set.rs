use crate::util::id::StateID;

/// A sparse set used for representing ordered NFA states.
///
/// This supports constant time addition and membership testing.
/// Clearing an entire set can also be done in constant time. Iteration
/// yields elements in the order in which they were inserted.
///
/// The data structure is based on: https://research.swtch.com/sparse
/// Note though that we don't actually use uninitialized memory. We
/// reuse the same set across all subset-construction steps, so the
/// initial allocation cost is paid once per determinization.
#[derive(Clone, Debug)]
pub(crate) struct SparseSet {
    /// The number of elements currently in this set.
    len: usize,
    /// Dense contains the ids in the order in which they were inserted.
    dense: Vec<StateID>,
    /// Sparse maps ids to their location in dense.
    ///
    /// A state ID is in the set if and only if
    /// sparse[id] < len && id == dense[sparse[id]].
    sparse: Vec<StateID>,
}

impl SparseSet {
    /// Create a new sparse set with the given capacity.
    ///
    /// Sparse sets have a fixed size and cannot grow. Attempting to
    /// insert more distinct elements than the total capacity of the
    /// set results in a panic.
    pub(crate) fn new(capacity: usize) -> SparseSet {
        assert!(
            capacity <= StateID::LIMIT,
            "sparse set capacity cannot exceed {:?}",
            StateID::LIMIT,
        );
        SparseSet {
            len: 0,
            dense: vec![StateID::ZERO; capacity],
            sparse: vec![StateID::ZERO; capacity],
        }
    }

    /// Returns the capacity of this set.
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.dense.len()
    }

    /// Returns the number of elements in this set.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns true if and only if this set is empty.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert the state ID value into this set and return true if the
    /// given state ID was not previously in this set.
    ///
    /// This operation is idempotent. If the given value is already in
    /// this set, then this is a no-op.
    #[inline]
    pub(crate) fn insert(&mut self, value: StateID) -> bool {
        if self.contains(value) {
            return false;
        }
        let i = self.len();
        assert!(
            i < self.capacity(),
            "{:?} exceeds capacity of {:?} when inserting {:?}",
            i,
            self.capacity(),
            value,
        );
        self.dense[i] = value;
        self.sparse[value] = StateID::must(i);
        self.len += 1;
        true
    }

    /// Returns true if and only if this set contains the given value.
    #[inline]
    pub(crate) fn contains(&self, value: StateID) -> bool {
        let i = self.sparse[value];
        i.as_usize() < self.len() && self.dense[i] == value
    }

    /// Clear this set such that it has no members.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.len = 0;
    }

    /// Returns an iterator over the members in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = StateID> + '_ {
        self.dense[..self.len()].iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(i: usize) -> StateID {
        StateID::must(i)
    }

    #[test]
    fn insert_contains_clear() {
        let mut set = SparseSet::new(10);
        assert!(set.is_empty());
        assert!(set.insert(sid(5)));
        assert!(!set.insert(sid(5)));
        assert!(set.insert(sid(0)));
        assert!(set.contains(sid(5)));
        assert!(set.contains(sid(0)));
        assert!(!set.contains(sid(1)));
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(!set.contains(sid(5)));
        assert!(set.is_empty());
    }

    #[test]
    fn iteration_order_is_insertion_order() {
        let mut set = SparseSet::new(10);
        set.insert(sid(3));
        set.insert(sid(1));
        set.insert(sid(7));
        let got: Vec<StateID> = set.iter().collect();
        assert_eq!(got, vec![sid(3), sid(1), sid(7)]);
    }
}
