//! Ordinal reordering for playlist items.
//!
//! Everything here is pure: callers hand in the current ordered ids of the
//! active items and get back the new order (or `None` when nothing moves).
//! Persisting the result is the manager's job.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::ReorderRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    Before,
    After,
}

/// A user reorder request, in any of the shapes the UI can produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveRequest {
    /// Explicit new order covering exactly the active items.
    Full(Vec<String>),
    /// Move the item at `source` so it ends up at index `target` of the
    /// resulting list. Targets past the end clamp to the last index.
    Index { source: usize, target: usize },
    /// Move the item at `source` into drop slot `slot` of the current
    /// list (the gap before item `slot`, or `len` for the end).
    Slot { source: usize, slot: usize },
    /// Drop `item_id` before or after `anchor_id`.
    Relative {
        item_id: String,
        anchor_id: String,
        placement: Placement,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReorderOutcome {
    Unchanged,
    Reordered(Vec<String>),
}

/// Where an item taken from `source` lands once it has been removed,
/// given a drop slot in the original list. `None` means it stays put.
pub fn resolve_move(len: usize, source: usize, target: usize) -> Option<usize> {
    if source >= len {
        return None;
    }

    let mut target = target.min(len);
    // Removing the item shifts every later slot down by one.
    if source < target {
        target -= 1;
    }

    (target != source).then_some(target)
}

/// Final index for a move expressed as a destination position.
pub fn resolve_position(len: usize, source: usize, target: usize) -> Option<usize> {
    if source >= len {
        return None;
    }
    let target = target.min(len - 1);
    (target != source).then_some(target)
}

/// Converts an element-relative drop into a slot index.
pub fn slot_for_anchor(anchor_index: usize, placement: Placement) -> usize {
    match placement {
        Placement::Before => anchor_index,
        Placement::After => anchor_index + 1,
    }
}

/// Computes the new order for `request`, or `Ok(None)` when the request
/// leaves the order as it is.
pub fn plan_reorder(
    current: &[String],
    request: &MoveRequest,
) -> Result<Option<Vec<String>>, ReorderRejection> {
    match request {
        MoveRequest::Full(ids) => plan_full(current, ids),
        MoveRequest::Index { source, target } => {
            check_source(current, *source)?;
            Ok(resolve_position(current.len(), *source, *target)
                .map(|destination| move_to(current, *source, destination)))
        }
        MoveRequest::Slot { source, slot } => {
            check_source(current, *source)?;
            Ok(resolve_move(current.len(), *source, *slot)
                .map(|destination| move_to(current, *source, destination)))
        }
        MoveRequest::Relative {
            item_id,
            anchor_id,
            placement,
        } => {
            if item_id == anchor_id {
                return Err(ReorderRejection::SelfAnchored(item_id.clone()));
            }
            let source = index_of(current, item_id)?;
            let anchor = index_of(current, anchor_id)?;
            let slot = slot_for_anchor(anchor, *placement);
            Ok(resolve_move(current.len(), source, slot)
                .map(|destination| move_to(current, source, destination)))
        }
    }
}

fn check_source(current: &[String], source: usize) -> Result<(), ReorderRejection> {
    if source >= current.len() {
        return Err(ReorderRejection::SourceOutOfRange {
            index: source,
            len: current.len(),
        });
    }
    Ok(())
}

fn move_to(current: &[String], source: usize, destination: usize) -> Vec<String> {
    let mut next = current.to_vec();
    let moved = next.remove(source);
    next.insert(destination, moved);
    next
}

fn plan_full(current: &[String], ids: &[String]) -> Result<Option<Vec<String>>, ReorderRejection> {
    let active: HashSet<&str> = current.iter().map(String::as_str).collect();
    let mut seen = HashSet::with_capacity(ids.len());

    for id in ids {
        if !active.contains(id.as_str()) {
            return Err(ReorderRejection::ForeignItem(id.clone()));
        }
        if !seen.insert(id.as_str()) {
            return Err(ReorderRejection::DuplicateItem(id.clone()));
        }
    }

    if ids.len() != current.len() {
        return Err(ReorderRejection::IncompleteOrdering {
            given: ids.len(),
            expected: current.len(),
        });
    }

    if ids == current {
        Ok(None)
    } else {
        Ok(Some(ids.to_vec()))
    }
}

fn index_of(current: &[String], id: &str) -> Result<usize, ReorderRejection> {
    current
        .iter()
        .position(|candidate| candidate == id)
        .ok_or_else(|| ReorderRejection::ForeignItem(id.to_string()))
}
