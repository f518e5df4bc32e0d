/// Per-worker activation bitmaps over the partition's local slots.
///
/// `current` holds the vertices active this level, `next` the ones queued
/// for the following level. A slot is in at most one of the two: `current`
/// is consumed at the start of the level and `next` only becomes `current`
/// through the barrier swap.
pub(crate) struct Frontier {
    current: BitSet,
    next: BitSet,
}

impl Frontier {
    pub fn new(len: usize) -> Self {
        Self {
            current: BitSet::new(len),
            next: BitSet::new(len),
        }
    }

    /// Marks a slot active for the very first level. Only used before the
    /// workers start running.
    pub fn seed(&mut self, loc: usize) {
        self.current.set(loc);
    }

    /// Queues a slot for the next level. Returns false if it was already
    /// queued, which makes repeated activation idempotent.
    pub fn set_next(&mut self, loc: usize) -> bool {
        self.next.set(loc)
    }

    pub fn next_count(&self) -> usize {
        self.next.count
    }

    /// Drains `current` into an ascending list of local slots.
    pub fn take_batch(&mut self) -> Vec<usize> {
        let batch = self.current.iter().collect();
        self.current.clear();
        batch
    }

    /// `current` becomes `next` and the new `next` starts empty.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
        self.next.clear();
    }
}

struct BitSet {
    words: Vec<u64>,
    count: usize,
}

impl BitSet {
    fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            count: 0,
        }
    }

    /// Returns true iff the bit was newly set.
    fn set(&mut self, loc: usize) -> bool {
        let word = &mut self.words[loc / 64];
        let mask = 1u64 << (loc % 64);
        if *word & mask != 0 {
            return false;
        }
        *word |= mask;
        self.count += 1;
        true
    }

    fn clear(&mut self) {
        self.words.fill(0);
        self.count = 0;
    }

    fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(i * 64 + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Frontier;

    #[test]
    fn batch_is_ascending_and_consumed() {
        let mut frontier = Frontier::new(200);
        for loc in [130, 5, 64, 5] {
            frontier.seed(loc);
        }
        assert_eq!(frontier.take_batch(), vec![5, 64, 130]);
        assert!(frontier.take_batch().is_empty());
    }

    #[test]
    fn repeated_activation_is_idempotent() {
        let mut frontier = Frontier::new(64);
        assert!(frontier.set_next(3));
        assert!(!frontier.set_next(3));
        assert_eq!(frontier.next_count(), 1);
    }

    #[test]
    fn swap_promotes_next_and_empties_it() {
        let mut frontier = Frontier::new(64);
        frontier.set_next(7);
        frontier.set_next(9);
        frontier.swap();
        assert_eq!(frontier.next_count(), 0);
        assert_eq!(frontier.take_batch(), vec![7, 9]);
    }
}
