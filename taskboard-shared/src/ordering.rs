//! Position ordering engine
//!
//! Siblings (boards of a project, columns of a board, tasks of a column) are
//! ordered by an `i64` key. Keys are spaced [`POSITION_STEP`] apart when
//! assigned fresh, so inserting or moving into a slot only needs the midpoint
//! of the two neighbours and never renumbers the set. When a gap can no longer
//! be split the set is rebalanced: every sibling receives an evenly spaced key
//! again.
//!
//! Everything here is pure. The repository reads the sibling set inside a
//! transaction, asks this module for a plan and writes the plan back.
//!
//! # Example
//!
//! ```
//! use taskboard_shared::ordering::{position_for_insert, POSITION_STEP};
//!
//! let existing = [POSITION_STEP, 2 * POSITION_STEP];
//!
//! // Between the two existing keys
//! let middle = position_for_insert(&existing, 1).unwrap();
//! assert!(existing[0] < middle && middle < existing[1]);
//!
//! // Append after the last key
//! assert_eq!(position_for_insert(&existing, 2).unwrap(), 3 * POSITION_STEP);
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

/// Distance between freshly assigned keys
pub const POSITION_STEP: i64 = 1 << 16;

/// Smallest gap that still has a key strictly inside it
const MIN_SPLITTABLE_GAP: i64 = 2;

/// Errors produced by position arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrderingError {
    /// No key is left between the neighbours of the target slot
    #[error("ordering keys exhausted at index {index}")]
    Exhausted { index: usize },
}

/// One member of a sibling set as seen by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub id: Uuid,
    pub position: i64,
    pub created_at: DateTime<Utc>,
}

impl Sibling {
    pub fn new(id: Uuid, position: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            position,
            created_at,
        }
    }

    /// Total order used everywhere: key, then creation time, then id
    fn order_key(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl From<(Uuid, i64, DateTime<Utc>)> for Sibling {
    fn from((id, position, created_at): (Uuid, i64, DateTime<Utc>)) -> Self {
        Self::new(id, position, created_at)
    }
}

/// Result of planning an insert or a move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    /// Key for the inserted or moved entity
    pub position: i64,

    /// New keys for the rest of the set; empty unless a rebalance was needed
    pub rebalanced: Vec<(Uuid, i64)>,
}

impl InsertPlan {
    /// Whether existing siblings must be rewritten before the insert
    pub fn requires_rebalance(&self) -> bool {
        !self.rebalanced.is_empty()
    }
}

/// Sorts siblings into their logical order
///
/// Duplicate keys (which only exist after corruption) are ordered by creation
/// time and then by id so the result is deterministic.
pub fn sort_siblings(siblings: &mut [Sibling]) {
    siblings.sort_by(Sibling::order_key);
}

/// Computes a key for inserting at `index` into an ordered key list
///
/// `index` is a 0-based slot; anything past the end appends. The result lies
/// strictly between the keys at `index - 1` and `index`, below the first key
/// or above the last one.
///
/// # Errors
///
/// Returns [`OrderingError::Exhausted`] when the neighbouring keys are
/// adjacent, duplicated, out of order, or the boundary would overflow `i64`.
pub fn position_for_insert(sorted: &[i64], index: usize) -> Result<i64, OrderingError> {
    let index = index.min(sorted.len());
    let exhausted = OrderingError::Exhausted { index };

    let before = index.checked_sub(1).and_then(|i| sorted.get(i)).copied();
    let after = sorted.get(index).copied();

    match (before, after) {
        (None, None) => Ok(POSITION_STEP),
        (None, Some(first)) => first.checked_sub(POSITION_STEP).ok_or(exhausted),
        (Some(last), None) => last.checked_add(POSITION_STEP).ok_or(exhausted),
        (Some(lo), Some(hi)) => match hi.checked_sub(lo) {
            Some(gap) if gap >= MIN_SPLITTABLE_GAP => Ok(lo + gap / 2),
            Some(_) => Err(exhausted),
            // Opposite signs with a gap wider than i64: halves cannot overflow
            None => Ok(lo / 2 + hi / 2),
        },
    }
}

/// Reassigns evenly spaced keys to every sibling
///
/// Returns `(id, new_position)` pairs in logical order, starting at
/// [`POSITION_STEP`].
pub fn rebalance(siblings: &[Sibling]) -> Vec<(Uuid, i64)> {
    let mut ordered = siblings.to_vec();
    sort_siblings(&mut ordered);

    ordered
        .iter()
        .zip(1_i64..)
        .map(|(sibling, slot)| (sibling.id, slot.saturating_mul(POSITION_STEP)))
        .collect()
}

/// Plans an insert at `index`, rebalancing only when keys are exhausted
///
/// # Errors
///
/// Returns [`OrderingError::Exhausted`] only if even the rebalanced set has
/// no room, which cannot happen for sets smaller than `i64::MAX / POSITION_STEP`.
pub fn plan_insert(siblings: &[Sibling], index: usize) -> Result<InsertPlan, OrderingError> {
    let mut ordered = siblings.to_vec();
    sort_siblings(&mut ordered);

    let keys: Vec<i64> = ordered.iter().map(|s| s.position).collect();
    match position_for_insert(&keys, index) {
        Ok(position) => Ok(InsertPlan {
            position,
            rebalanced: Vec::new(),
        }),
        Err(OrderingError::Exhausted { .. }) => plan_insert_rebalanced(&ordered, index),
    }
}

/// Plans an insert at `index` after unconditionally rebalancing the set
///
/// Used as the last resort after repeated key collisions.
///
/// # Errors
///
/// See [`plan_insert`].
pub fn plan_insert_rebalanced(
    siblings: &[Sibling],
    index: usize,
) -> Result<InsertPlan, OrderingError> {
    let rebalanced = rebalance(siblings);
    let keys: Vec<i64> = rebalanced.iter().map(|(_, position)| *position).collect();
    let position = position_for_insert(&keys, index)?;

    Ok(InsertPlan {
        position,
        rebalanced,
    })
}

/// Plans moving `moving_id` to `index` within `siblings`
///
/// The moving entity is removed from the set first, so `index` is its
/// logical slot among the remaining siblings. For a cross-parent move the
/// destination set does not contain the entity and this is a plain insert.
///
/// # Errors
///
/// See [`plan_insert`].
pub fn plan_move(
    siblings: &[Sibling],
    moving_id: Uuid,
    index: usize,
    force_rebalance: bool,
) -> Result<InsertPlan, OrderingError> {
    let remaining: Vec<Sibling> = siblings
        .iter()
        .filter(|s| s.id != moving_id)
        .cloned()
        .collect();

    if force_rebalance {
        plan_insert_rebalanced(&remaining, index)
    } else {
        plan_insert(&remaining, index)
    }
}

/// Checks that keys are pairwise distinct once sorted
pub fn is_strictly_ordered(siblings: &[Sibling]) -> bool {
    let mut ordered = siblings.to_vec();
    sort_siblings(&mut ordered);
    ordered.windows(2).all(|pair| pair[0].position < pair[1].position)
}
