/// Result of greedy packing
#[derive(Debug)]
pub(crate) struct Packed<T> {
    pub(crate) chunks: Vec<Vec<T>>,
    /// Items that cannot fit even alone
    pub(crate) oversized: Vec<T>,
}

/// Pack items in order into chunks whose framed size stays within `limit`.
///
/// A chunk of items `a, b, c` weighs `frame + |a| + |b| + |c| + 2 * separator`.
pub(crate) fn pack<T>(
    items: Vec<T>,
    size_of: impl Fn(&T) -> usize,
    frame: usize,
    separator: usize,
    limit: usize,
) -> Packed<T> {
    let mut chunks = Vec::new();
    let mut oversized = Vec::new();
    let mut current: Vec<T> = Vec::new();
    let mut size = frame;

    for item in items {
        let item_size = size_of(&item);
        if frame.saturating_add(item_size) > limit {
            oversized.push(item);
            continue;
        }
        let extra = if current.is_empty() { 0 } else { separator };
        if size + extra + item_size > limit {
            chunks.push(std::mem::take(&mut current));
            size = frame;
            current.push(item);
            size += item_size;
        } else {
            current.push(item);
            size += extra + item_size;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    Packed { chunks, oversized }
}
