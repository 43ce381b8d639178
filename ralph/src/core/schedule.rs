//! Adapter scheduling and attempt identity.

/// Opaque, collision-free attempt id for a 1-based iteration.
pub fn future_id(iteration: u32) -> String {
    format!("future_{iteration}")
}

/// Round-robin pick for a 1-based iteration: `items[(iteration - 1) % len]`.
///
/// Pure fairness policy; cost, latency, and past success are not considered.
/// Returns `None` for an empty list or iteration 0.
pub fn round_robin<T>(items: &[T], iteration: u32) -> Option<&T> {
    if items.is_empty() || iteration == 0 {
        return None;
    }
    let index = (iteration as usize - 1) % items.len();
    items.get(index)
}
