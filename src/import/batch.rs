//! Groups a stream of parsed rows into batches to amortize write cost.

/// When to cut a batch, chosen at construction time.
pub enum BatchPolicy<T> {
    /// Flush once the accumulated batch holds `n` items.
    FixedSize(usize),
    /// Flush when the predicate, given the batch accumulated so far and the
    /// incoming item, returns true.
    Custom(Box<dyn Fn(&[T], &T) -> bool + Send>),
}

impl<T> BatchPolicy<T> {
    fn should_flush(&self, current: &[T], next: &T) -> bool {
        match self {
            BatchPolicy::FixedSize(n) => current.len() >= *n,
            BatchPolicy::Custom(predicate) => predicate(current, next),
        }
    }
}

/// Iterator adapter emitting `Vec<T>` batches.
///
/// Before each incoming item the policy is evaluated against the batch
/// accumulated so far; if it fires, the current batch is emitted and the item
/// starts a new one. Any non-empty remainder is emitted at end of input.
/// Item order within and across batches matches the input.
pub struct Batched<I: Iterator> {
    inner: I,
    policy: BatchPolicy<I::Item>,
    current: Vec<I::Item>,
    done: bool,
}

impl<I: Iterator> Iterator for Batched<I> {
    type Item = Vec<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            match self.inner.next() {
                Some(item) => {
                    if self.policy.should_flush(&self.current, &item) {
                        let batch = std::mem::take(&mut self.current);
                        self.current.push(item);
                        return Some(batch);
                    }
                    self.current.push(item);
                }
                None => {
                    self.done = true;
                    if self.current.is_empty() {
                        return None;
                    }
                    return Some(std::mem::take(&mut self.current));
                }
            }
        }
    }
}

pub trait BatchedExt: Iterator + Sized {
    fn batched(self, policy: BatchPolicy<Self::Item>) -> Batched<Self> {
        Batched {
            inner: self,
            policy,
            current: Vec::new(),
            done: false,
        }
    }
}

impl<I: Iterator> BatchedExt for I {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_size_emits_full_batches_and_remainder() {
        let batches: Vec<Vec<i32>> = (0..25).batched(BatchPolicy::FixedSize(10)).collect();

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 10);
        assert_eq!(batches[2].len(), 5);
    }

    #[test]
    fn exact_multiple_has_no_short_batch() {
        let batches: Vec<Vec<i32>> = (0..30).batched(BatchPolicy::FixedSize(10)).collect();

        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() == 10));
    }

    #[test]
    fn batch_count_is_ceil_of_len_over_n() {
        for (len, n) in [(0usize, 7usize), (1, 7), (7, 7), (8, 7), (100, 13)] {
            let batches: Vec<Vec<usize>> = (0..len).batched(BatchPolicy::FixedSize(n)).collect();
            assert_eq!(batches.len(), len.div_ceil(n), "len={len} n={n}");
        }
    }

    #[test]
    fn concatenation_preserves_input_order() {
        let input: Vec<i32> = (0..97).collect();
        let rejoined: Vec<i32> = input
            .clone()
            .into_iter()
            .batched(BatchPolicy::FixedSize(9))
            .flatten()
            .collect();

        assert_eq!(rejoined, input);
    }

    #[test]
    fn empty_input_emits_nothing() {
        let batches: Vec<Vec<i32>> = std::iter::empty()
            .batched(BatchPolicy::FixedSize(10))
            .collect();
        assert!(batches.is_empty());
    }

    #[test]
    fn custom_predicate_controls_flush() {
        // Cut a batch whenever the next value is smaller than the last one.
        let policy = BatchPolicy::Custom(Box::new(|current: &[i32], next: &i32| {
            current.last().is_some_and(|last| next < last)
        }));

        let batches: Vec<Vec<i32>> = vec![1, 2, 3, 1, 2, 1].into_iter().batched(policy).collect();

        assert_eq!(batches, vec![vec![1, 2, 3], vec![1, 2], vec![1]]);
    }
}
