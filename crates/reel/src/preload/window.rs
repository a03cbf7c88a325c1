use super::status::PreloadPriority;

/// Feed positions to warm after `current_index`, nearest first.
///
/// Covers `current_index + 1 ..= current_index + count`, clamped to a feed of
/// `len` items.
pub fn preload_window(len: usize, current_index: usize, count: usize) -> Vec<(usize, PreloadPriority)> {
    (1..=count)
        .filter_map(|offset| {
            let index = current_index.checked_add(offset)?;
            (index < len).then(|| (index, PreloadPriority::from_offset(offset)))
        })
        .collect()
}
