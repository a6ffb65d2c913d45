//! Per-frame visibility culling and compaction

use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::camera::FrameCamera;
use crate::gaussian::GaussianStore;

/// Compacted `(index, depth)` pairs of the visible gaussians
///
/// Slot order is whatever order the atomic reservations happened in; only
/// the sorter gives it a meaning.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleSet {
    pub indices: Vec<u32>,
    pub depths: Vec<f32>,
}

impl VisibleSet {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Visibility predicate shared by the CPU and GPU paths
#[inline]
pub fn is_visible(depth: f32, opacity: f32, near: f32, far: f32, min_opacity: f32) -> bool {
    depth >= near && depth <= far && opacity >= min_opacity
}

/// Select gaussians inside the near/far range with enough opacity
///
/// Each visible gaussian reserves its output slot with an atomic increment,
/// exactly like the GPU kernel does.
pub fn filter_visible(store: &GaussianStore, camera: &FrameCamera, min_opacity: f32) -> VisibleSet {
    let n = store.len();
    let counter = AtomicU32::new(0);
    let slots: Vec<(AtomicU32, AtomicU32)> =
        (0..n).map(|_| (AtomicU32::new(0), AtomicU32::new(0))).collect();

    (0..n).into_par_iter().for_each(|i| {
        let depth = camera.depth(store.position(i));
        if !is_visible(depth, store.opacities[i], camera.near, camera.far, min_opacity) {
            return;
        }
        let slot = counter.fetch_add(1, Ordering::Relaxed) as usize;
        slots[slot].0.store(i as u32, Ordering::Relaxed);
        slots[slot].1.store(depth.to_bits(), Ordering::Relaxed);
    });

    let count = counter.into_inner() as usize;
    let (indices, depths) = slots
        .into_iter()
        .take(count)
        .map(|(index, depth)| (index.into_inner(), f32::from_bits(depth.into_inner())))
        .unzip();

    VisibleSet { indices, depths }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic;

    #[test]
    fn test_counts_match_predicate() {
        let store = synthetic::random_cloud(2_000, 7);
        let camera = crate::camera::OrbitCamera::default().frame(320, 240);
        let min_opacity = 0.3;

        let visible = filter_visible(&store, &camera, min_opacity);
        let expected = (0..store.len())
            .filter(|&i| {
                is_visible(
                    camera.depth(store.position(i)),
                    store.opacities[i],
                    camera.near,
                    camera.far,
                    min_opacity,
                )
            })
            .count();
        assert_eq!(visible.len(), expected);
        assert!(expected > 0 && expected < store.len());
    }

    #[test]
    fn test_excluded_never_appear() {
        let store = synthetic::axis_line(&[0.5, 2.0, 200.0, -1.0], 0.9);
        let camera = synthetic::axis_camera(64, 64);
        let visible = filter_visible(&store, &camera, 0.1);

        let mut indices = visible.indices.clone();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1]);
        for (i, d) in visible.indices.iter().zip(&visible.depths) {
            assert_eq!(*d, camera.depth(store.position(*i as usize)));
        }
    }

    #[test]
    fn test_empty_store() {
        let store = GaussianStore::default();
        let camera = synthetic::axis_camera(8, 8);
        assert!(filter_visible(&store, &camera, 0.02).is_empty());
    }
}
