//! Room sizing from online-player counts.

/// Rooms wanted for `online` players: one per `threshold` players, rounded
/// up, and never fewer than one while a set is scheduled.
#[must_use]
pub fn compute_room_allocation(online: usize, threshold: u32) -> usize {
    let threshold = usize::try_from(threshold.max(1)).unwrap_or(usize::MAX);
    online.div_ceil(threshold).max(1)
}

/// What the lobby should do to reach the desired room count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPlan {
    /// Create this many rooms.
    Grow(usize),
    /// Retire up to this many empty waiting rooms.
    Shrink(usize),
    /// Nothing to do.
    Keep,
}

/// Compares the current room count with the desired one.
#[must_use]
pub fn plan_allocation(current_rooms: usize, desired_rooms: usize) -> AllocationPlan {
    match current_rooms.cmp(&desired_rooms) {
        std::cmp::Ordering::Less => AllocationPlan::Grow(desired_rooms - current_rooms),
        std::cmp::Ordering::Greater => AllocationPlan::Shrink(current_rooms - desired_rooms),
        std::cmp::Ordering::Equal => AllocationPlan::Keep,
    }
}
