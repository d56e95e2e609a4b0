//! Row-count capping by uniform sampling.

use rand::{seq::index, Rng};

/// Reduces `rows` to at most `cap` entries chosen uniformly at random,
/// keeping their original relative order. Without a cap, or when the rows
/// already fit, they are returned unchanged.
pub fn sample<T, R>(rows: Vec<T>, cap: Option<usize>, rng: &mut R) -> Vec<T>
where
    R: Rng + ?Sized,
{
    let Some(cap) = cap else {
        return rows;
    };
    if rows.len() <= cap {
        return rows;
    }

    let mut keep = index::sample(rng, rows.len(), cap).into_vec();
    keep.sort_unstable();

    let mut picked = Vec::with_capacity(cap);
    let mut next = keep.into_iter().peekable();
    for (position, row) in rows.into_iter().enumerate() {
        if next.peek() == Some(&position) {
            picked.push(row);
            next.next();
        }
    }
    picked
}
