//! Muon chamber occupancy
//!
//! Showering muons and punch-through leave many compatible segments in a
//! chamber layer. The occupancy table records, per layer crossed by the
//! standalone track, the largest number of measurements found near one of
//! its hits.

use muontrack::{DetId, HitRef, Technology, Track};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChamberOccupancy {
    counts: BTreeMap<u32, usize>,
}

impl ChamberOccupancy {
    /// Occupancy of the layers crossed by `standalone`
    ///
    /// `measurements` are the muon-layer measurements of the event; when
    /// empty the standalone track's own hits are counted.
    pub fn compute(standalone: &Track, measurements: &[HitRef], window: f64) -> Self {
        let pool: &[HitRef] = if measurements.is_empty() {
            &standalone.hits
        } else {
            measurements
        };

        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for hit in standalone.hits.iter().filter(|h| h.valid && h.is_muon()) {
            let layer = hit.layer_key();
            let count = pool
                .iter()
                .filter(|m| {
                    m.valid
                        && m.layer_key() == layer
                        && m.position.distance(&hit.position) <= window
                })
                .count();
            let entry = counts.entry(layer).or_insert(0);
            *entry = (*entry).max(count);
        }

        log::trace!(
            "Standalone track {}: occupancy of {} layers {:?}",
            standalone.id,
            counts.len(),
            counts
        );
        Self { counts }
    }

    pub fn from_counts(counts: BTreeMap<u32, usize>) -> Self {
        Self { counts }
    }

    pub fn count(&self, layer_key: u32) -> usize {
        self.counts.get(&layer_key).copied().unwrap_or(0)
    }

    /// (layer key, technology, count) for every known layer
    pub fn layers(&self) -> impl Iterator<Item = (u32, Option<Technology>, usize)> + '_ {
        self.counts
            .iter()
            .map(|(&layer, &count)| (layer, DetId(layer).technology(), count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
