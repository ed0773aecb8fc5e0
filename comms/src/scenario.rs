//! Scenario catalog and the deterministic per-worker partitioning.

use std::num::NonZeroUsize;

/// One reproducible network condition: a topology paired with a traffic
/// pattern. Identified by catalog position, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Scenario {
    pub topology: u32,
    pub traffic: u32,
}

/// A contiguous slice of the catalog owned by exactly one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub start: usize,
    pub end: usize,
}

impl Assignment {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The ordered, process-wide-identical scenario catalog.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Catalog(Vec<Scenario>);

impl Catalog {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self(scenarios)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.0
    }

    /// Splits the catalog into `workers` contiguous assignments.
    ///
    /// Assignment `i < workers - 1` covers `floor(len / workers)` scenarios
    /// starting at `i * floor(len / workers)`; the last assignment runs to
    /// the end of the catalog and absorbs the division remainder. With more
    /// workers than scenarios some assignments are empty, which is valid:
    /// those workers contribute no episodes.
    pub fn partition(&self, workers: NonZeroUsize) -> Vec<Assignment> {
        let workers = workers.get();
        let per_worker = self.len() / workers;

        (0..workers)
            .map(|i| Assignment {
                start: i * per_worker,
                end: if i == workers - 1 {
                    self.len()
                } else {
                    (i + 1) * per_worker
                },
            })
            .collect()
    }

    pub fn slice(&self, assignment: Assignment) -> &[Scenario] {
        &self.0[assignment.start..assignment.end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(len: usize) -> Catalog {
        Catalog::new(
            (0..len)
                .map(|i| Scenario {
                    topology: i as u32,
                    traffic: (i % 3) as u32,
                })
                .collect(),
        )
    }

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn ten_scenarios_three_workers() {
        let parts = catalog(10).partition(workers(3));

        let sizes: Vec<usize> = parts.iter().map(Assignment::len).collect();
        assert_eq!(sizes, [3, 3, 4]);
        assert_eq!(parts[2], Assignment { start: 6, end: 10 });
    }

    #[test]
    fn union_covers_catalog_exactly_once() {
        for len in 0..25 {
            for n in 1..8 {
                let cat = catalog(len);
                let parts = cat.partition(workers(n));

                assert_eq!(parts.len(), n);
                assert_eq!(parts[0].start, 0);
                assert_eq!(parts[n - 1].end, len);

                for pair in parts.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }

                let covered: usize = parts.iter().map(Assignment::len).sum();
                assert_eq!(covered, len);
            }
        }
    }

    #[test]
    fn more_workers_than_scenarios_leaves_empties() {
        let cat = catalog(2);
        let parts = cat.partition(workers(5));

        assert!(parts[..4].iter().all(Assignment::is_empty));
        assert_eq!(parts[4].len(), 2);
        assert_eq!(cat.slice(parts[0]), &[]);
    }

    #[test]
    fn remainder_only_widens_the_last_assignment() {
        for len in 1..40 {
            for n in 1..10 {
                let parts = catalog(len).partition(workers(n));
                let base = len / n;

                for part in &parts[..n - 1] {
                    assert_eq!(part.len(), base);
                }
                assert_eq!(parts[n - 1].len(), base + len % n);
            }
        }
    }
}
