//! Tracker track preselection inside a region of interest

use crate::config::BuilderConfig;
use crate::region::RegionOfInterest;
use muontrack::{delta_phi, EtaPhiGrid, Track, Trajectory};

/// Padding on the grid query so cell edges never lose a boundary track
const GRID_QUERY_MARGIN: f64 = 1e-9;

/// A tracker track under consideration for one standalone track
#[derive(Debug, Clone)]
pub struct TrackCand<'a> {
    /// Position of the tracker track in the event collection
    pub tracker_index: usize,
    pub track: &'a Track,
    pub trajectory: Option<Trajectory>,
}

impl<'a> TrackCand<'a> {
    pub fn new(tracker_index: usize, track: &'a Track) -> Self {
        Self {
            tracker_index,
            track,
            trajectory: None,
        }
    }
}

/// Parameter compatibility between a standalone and a tracker track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackMatcher {
    pub chi2_cut: f64,
}

impl TrackMatcher {
    pub fn new(chi2_cut: f64) -> Self {
        Self { chi2_cut }
    }

    /// Chi-square of the (q/pT, eta, phi) difference, `None` when the
    /// summed covariance cannot be inverted
    pub fn chi2(&self, standalone: &Track, tracker: &Track) -> Option<f64> {
        let mut delta = standalone.direction_vector() - tracker.direction_vector();
        delta[2] = delta_phi(standalone.parameters.phi, tracker.parameters.phi);
        let covariance = standalone.direction_covariance() + tracker.direction_covariance();
        let inverse = covariance.try_inverse()?;
        let chi2 = (delta.transpose() * inverse * delta)[(0, 0)];
        chi2.is_finite().then_some(chi2)
    }

    pub fn matches(&self, standalone: &Track, tracker: &Track) -> bool {
        self.chi2(standalone, tracker)
            .map(|chi2| chi2 <= self.chi2_cut)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct CandidateFilter {
    pub pt_cut: f64,
    pub grid_min_tracks: usize,
    pub grid_cell_size: f64,
    pub matcher: Option<TrackMatcher>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self::from_config(&BuilderConfig::default())
    }
}

impl CandidateFilter {
    pub fn from_config(config: &BuilderConfig) -> Self {
        Self {
            pt_cut: config.pt_cut,
            grid_min_tracks: config.grid_min_tracks,
            grid_cell_size: config.grid_cell_size,
            matcher: config.match_chi2_cut.map(TrackMatcher::new),
        }
    }

    fn accepts(&self, region: &RegionOfInterest, standalone: &Track, track: &Track) -> bool {
        track.parameters.pt >= self.pt_cut
            && region.contains(track)
            && self
                .matcher
                .as_ref()
                .map(|m| m.matches(standalone, track))
                .unwrap_or(true)
    }

    /// Indices of the accepted tracker tracks, in collection order
    pub fn select_indices(
        &self,
        region: &RegionOfInterest,
        standalone: &Track,
        tracks: &[Track],
    ) -> Vec<usize> {
        if !region.valid || tracks.is_empty() {
            return Vec::new();
        }

        if tracks.len() >= self.grid_min_tracks {
            let mut grid = EtaPhiGrid::new(self.grid_cell_size);
            for (i, track) in tracks.iter().enumerate() {
                grid.insert(track.parameters.eta, track.parameters.phi, i);
            }
            grid.query(
                region.eta,
                region.phi,
                region.half_eta + GRID_QUERY_MARGIN,
                region.half_phi + GRID_QUERY_MARGIN,
            )
            .into_iter()
            .filter(|&i| self.accepts(region, standalone, &tracks[i]))
            .collect()
        } else {
            tracks
                .iter()
                .enumerate()
                .filter(|(_, track)| self.accepts(region, standalone, track))
                .map(|(i, _)| i)
                .collect()
        }
    }

    /// Tracker tracks compatible with the region
    ///
    /// An invalid region or an empty collection gives no candidates.
    pub fn select<'a>(
        &self,
        region: &RegionOfInterest,
        standalone: &Track,
        tracks: &'a [Track],
    ) -> Vec<TrackCand<'a>> {
        self.select_indices(region, standalone, tracks)
            .into_iter()
            .map(|i| TrackCand::new(i, &tracks[i]))
            .collect()
    }
}
