//! Depth ordering of the visible set
//!
//! The GPU sorts 32-bit keys with a bitonic network. The key mapping below is
//! shared with `shaders/sort.wgsl`: it preserves the float order, folds the
//! sort direction into the key, and inverts exactly.

use crate::visibility::VisibleSet;

/// Key that sorts after every real depth; used to pad to a power of two
pub const SENTINEL_KEY: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthOrder {
    /// Nearest first (ascending depth)
    #[default]
    FrontToBack,
    /// Farthest first (descending depth)
    BackToFront,
}

impl DepthOrder {
    pub fn descending(self) -> bool {
        self == DepthOrder::BackToFront
    }
}

/// Map a depth to a key whose unsigned order matches the requested depth order
#[inline]
pub fn depth_to_key(depth: f32, order: DepthOrder) -> u32 {
    let bits = depth.to_bits();
    let key = if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    };
    if order.descending() {
        !key
    } else {
        key
    }
}

/// Exact inverse of [`depth_to_key`]
#[inline]
pub fn key_to_depth(key: u32, order: DepthOrder) -> f32 {
    let key = if order.descending() { !key } else { key };
    let bits = if key & 0x8000_0000 != 0 {
        key & 0x7fff_ffff
    } else {
        !key
    };
    f32::from_bits(bits)
}

/// Smallest power of two >= `n` (1 for n = 0)
#[inline]
pub fn next_pow2(n: u32) -> u32 {
    n.max(1).next_power_of_two()
}

/// One compare-exchange step of the bitonic network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitonicStep {
    /// Size of the bitonic sequences being merged
    pub k: u32,
    /// Compare distance
    pub j: u32,
}

/// Every (k, j) step needed to sort `padded` (a power of two) elements
pub fn bitonic_steps(padded: u32) -> Vec<BitonicStep> {
    let mut steps = Vec::new();
    let mut k = 2;
    while k <= padded {
        let mut j = k / 2;
        while j > 0 {
            steps.push(BitonicStep { k, j });
            j /= 2;
        }
        k *= 2;
    }
    steps
}

/// Sort (key, value) pairs ascending by key with the same network the GPU runs
///
/// `keys.len()` need not be a power of two; the tail is padded with
/// [`SENTINEL_KEY`] internally and dropped again.
pub fn bitonic_sort(keys: &mut Vec<u32>, values: &mut Vec<u32>) {
    let n = keys.len();
    let padded = next_pow2(n as u32) as usize;
    keys.resize(padded, SENTINEL_KEY);
    values.resize(padded, u32::MAX);

    for step in bitonic_steps(padded as u32) {
        let (k, j) = (step.k as usize, step.j as usize);
        for i in 0..padded {
            let partner = i ^ j;
            if partner <= i {
                continue;
            }
            let ascending = i & k == 0;
            if (keys[i] > keys[partner]) == ascending {
                keys.swap(i, partner);
                values.swap(i, partner);
            }
        }
    }

    keys.truncate(n);
    values.truncate(n);
}

/// Visible gaussians in compositing order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortedSet {
    pub indices: Vec<u32>,
    pub depths: Vec<f32>,
    pub order: DepthOrder,
}

impl SortedSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn is_monotonic(&self) -> bool {
        self.depths.windows(2).all(|w| match self.order {
            DepthOrder::FrontToBack => w[0] <= w[1],
            DepthOrder::BackToFront => w[0] >= w[1],
        })
    }
}

/// Sort the compacted visible set the way the GPU does
pub fn sort_visible(visible: &VisibleSet, order: DepthOrder) -> SortedSet {
    let mut keys: Vec<u32> = visible.depths.iter().map(|&d| depth_to_key(d, order)).collect();
    let mut values = visible.indices.clone();
    bitonic_sort(&mut keys, &mut values);

    SortedSet {
        depths: keys.iter().map(|&k| key_to_depth(k, order)).collect(),
        indices: values,
        order,
    }
}
