//! Order in which a fleet-wide transition visits participants.

use crate::participant::ParticipantProxy;
use crate::state::{Direction, PriorityKind, Transition};

/// Sort `items` for a walk in `direction`.
///
/// Descending walks go lowest priority first and keep insertion order within
/// a priority. Ascending walks are the exact reverse of that.
pub fn order_by_priority<T>(
    mut items: Vec<T>,
    direction: Direction,
    priority: impl Fn(&T) -> i32,
) -> Vec<T> {
    items.sort_by_key(|item| priority(item));
    if direction == Direction::Ascending {
        items.reverse();
    }
    items
}

/// Participants in the order `transition` visits them. Shutdown keeps
/// insertion order.
pub fn walk_order(participants: &[ParticipantProxy], transition: Transition) -> Vec<ParticipantProxy> {
    let Some((direction, kind)) = transition.ordering() else {
        return participants.to_vec();
    };
    order_by_priority(participants.to_vec(), direction, |p| match kind {
        PriorityKind::Init => p.init_priority(),
        PriorityKind::Start => p.start_priority(),
    })
}
