//! Primary key inference.
//!
//! Generate-and-test over column subsets: every combination of columns
//! within the configured size bounds is projected out of the table and
//! checked for duplicate rows. The full column set is never proposed.
//!
//! The search is exponential in the column count. Narrowing `max` is the
//! caller's job for wide tables.

use crate::table::Table;
use crate::value::ValueKey;
use std::collections::HashSet;

/// Invalid key size bounds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyBoundsError {
    #[error("minimum key length must be at least 1")]
    ZeroMin,

    #[error("maximum key length {max} is below the minimum {min}")]
    MaxBelowMin { min: usize, max: usize },
}

/// Inclusive size bounds for key candidates.
///
/// `max` defaults to one less than the column count and is always clamped
/// to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBounds {
    min: usize,
    max: Option<usize>,
}

impl KeyBounds {
    pub fn new(min: usize, max: Option<usize>) -> Result<Self, KeyBoundsError> {
        if min == 0 {
            return Err(KeyBoundsError::ZeroMin);
        }
        if let Some(max) = max
            && max < min
        {
            return Err(KeyBoundsError::MaxBelowMin { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// Effective sizes for a table of `n_cols` columns; empty when none fit.
    pub fn sizes(&self, n_cols: usize) -> std::ops::RangeInclusive<usize> {
        let ceiling = n_cols.saturating_sub(1);
        let hi = self.max.map_or(ceiling, |m| m.min(ceiling));
        self.min..=hi
    }
}

impl Default for KeyBounds {
    fn default() -> Self {
        Self { min: 1, max: None }
    }
}

/// Lexicographic k-combinations of `0..n`, as sorted index vectors.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl Combinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        let k = self.indices.len();
        // Rightmost index that can still move right.
        match (0..k).rev().find(|&i| self.indices[i] != i + self.n - k) {
            Some(i) => {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
            }
            None => self.done = true,
        }
        Some(current)
    }
}

/// True if no two rows agree on every column in `columns`.
pub fn is_unique(table: &Table, columns: &[usize]) -> bool {
    let mut seen: HashSet<Vec<ValueKey<'_>>> = HashSet::with_capacity(table.n_rows());
    table
        .rows()
        .iter()
        .all(|row| seen.insert(columns.iter().map(|&c| row[c].key()).collect()))
}

/// Column subsets that identify every row, in report order.
///
/// An empty result means no key exists within the bounds; it is not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyCandidates(Vec<Vec<String>>);

impl KeyCandidates {
    pub fn new(keys: Vec<Vec<String>>) -> Self {
        Self(keys)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.0.iter().map(Vec::as_slice)
    }

    pub fn contains(&self, key: &[&str]) -> bool {
        self.0.iter().any(|k| k.iter().map(String::as_str).eq(key.iter().copied()))
    }

    pub fn into_inner(self) -> Vec<Vec<String>> {
        self.0
    }
}

/// Configured primary key search.
#[derive(Debug, Clone, Default)]
pub struct KeySearch {
    bounds: KeyBounds,
    first_tier_only: bool,
}

impl KeySearch {
    pub fn new(bounds: KeyBounds) -> Self {
        Self {
            bounds,
            first_tier_only: false,
        }
    }

    /// Stop after the smallest size that yields any key.
    pub fn first_tier_only(mut self, yes: bool) -> Self {
        self.first_tier_only = yes;
        self
    }

    pub fn bounds(&self) -> KeyBounds {
        self.bounds
    }

    /// Enumerate subsets by increasing size, lexicographic within a size,
    /// and keep those that are unique over `table`.
    ///
    /// A superset of a key already found is unique too and is accepted
    /// without projecting the table again.
    pub fn search(&self, table: &Table) -> KeyCandidates {
        let n = table.n_cols();
        let mut found: Vec<Vec<usize>> = Vec::new();

        for k in self.bounds.sizes(n) {
            let subsets: Vec<Vec<usize>> = Combinations::new(n, k).collect();
            let implied: Vec<bool> = subsets
                .iter()
                .map(|s| found.iter().any(|key| is_subset(key, s)))
                .collect();
            let verdicts = test_tier(table, &subsets, &implied);

            let before = found.len();
            found.extend(
                subsets
                    .into_iter()
                    .zip(verdicts)
                    .filter_map(|(s, unique)| unique.then_some(s)),
            );
            tracing::debug!(
                size = k,
                tested = implied.iter().filter(|i| !**i).count(),
                pruned = implied.iter().filter(|i| **i).count(),
                found = found.len() - before,
                "key tier searched"
            );

            if self.first_tier_only && found.len() > before {
                break;
            }
        }

        KeyCandidates(
            found
                .into_iter()
                .map(|key| key.into_iter().map(|c| table.columns()[c].clone()).collect())
                .collect(),
        )
    }
}

/// Both slices sorted ascending.
fn is_subset(small: &[usize], big: &[usize]) -> bool {
    let mut big = big.iter();
    small.iter().all(|s| big.any(|b| b == s))
}

#[cfg(not(feature = "parallel"))]
fn test_tier(table: &Table, subsets: &[Vec<usize>], implied: &[bool]) -> Vec<bool> {
    subsets
        .iter()
        .zip(implied)
        .map(|(s, &implied)| implied || is_unique(table, s))
        .collect()
}

#[cfg(feature = "parallel")]
fn test_tier(table: &Table, subsets: &[Vec<usize>], implied: &[bool]) -> Vec<bool> {
    use rayon::prelude::*;

    subsets
        .par_iter()
        .zip(implied.par_iter())
        .map(|(s, &implied)| implied || is_unique(table, s))
        .collect()
}
