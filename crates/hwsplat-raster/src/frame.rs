//! Per-frame stage bookkeeping

use std::fmt;
use std::time::{Duration, Instant};

use crate::covariance::Footprint;

/// States of one frame, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FrameStage {
    Init,
    Visibility,
    ReadbackVisibleCount,
    Sort,
    Footprint,
    Color,
    Composite,
    Points,
    Done,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameStage::Init => "init",
            FrameStage::Visibility => "visibility",
            FrameStage::ReadbackVisibleCount => "readback",
            FrameStage::Sort => "sort",
            FrameStage::Footprint => "footprint",
            FrameStage::Color => "color",
            FrameStage::Composite => "composite",
            FrameStage::Points => "points",
            FrameStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Where the selected gaussian landed this frame and its footprint
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectedFootprint {
    pub index: u32,
    /// Position in the sorted order
    pub slot: u32,
    pub footprint: Footprint,
}

/// What a frame did and how long each stage took on the host
#[derive(Clone, Debug, Default)]
pub struct FrameReport {
    pub visible_count: u32,
    pub stages: Vec<(FrameStage, Duration)>,
    /// Set when a gaussian is selected and drawn as a quad
    pub selected: Option<SelectedFootprint>,
}

impl FrameReport {
    pub fn new() -> Self {
        Self {
            visible_count: 0,
            stages: vec![(FrameStage::Init, Duration::ZERO)],
            selected: None,
        }
    }

    /// Run `f` as `stage`, recording its wall time
    pub fn time<T>(&mut self, stage: FrameStage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.stages.push((stage, start.elapsed()));
        out
    }

    pub fn finish(&mut self) {
        self.stages.push((FrameStage::Done, Duration::ZERO));
        tracing::debug!(
            "Frame: {} visible, {:.3} ms [{}]",
            self.visible_count,
            self.total().as_secs_f64() * 1e3,
            self.sequence()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ")
        );
    }

    pub fn ran(&self, stage: FrameStage) -> bool {
        self.stages.iter().any(|(s, _)| *s == stage)
    }

    pub fn sequence(&self) -> Vec<FrameStage> {
        self.stages.iter().map(|(s, _)| *s).collect()
    }

    pub fn total(&self) -> Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_records_in_order() {
        let mut report = FrameReport::new();
        let v = report.time(FrameStage::Visibility, || 3);
        report.visible_count = v;
        report.time(FrameStage::Sort, || ());
        report.finish();

        assert_eq!(
            report.sequence(),
            vec![FrameStage::Init, FrameStage::Visibility, FrameStage::Sort, FrameStage::Done]
        );
        assert!(report.ran(FrameStage::Sort));
        assert!(!report.ran(FrameStage::Composite));
    }
}
