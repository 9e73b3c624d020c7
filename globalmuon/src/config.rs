//! Builder configuration
//!
//! Every struct implements `Default` and deserializes with
//! `#[serde(default)]`, so a JSON file only needs the values it changes.

use crate::error::{BuildError, Result};
use muontrack::{FitterConfig, PropagationDirection, Technology};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Region of interest sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Number of standard deviations of the eta uncertainty
    pub eta_window_scale: f64,
    /// Number of standard deviations of the phi uncertainty
    pub phi_window_scale: f64,
    /// Low-pT widening: windows grow by (1 + pt_widen_const / pT)
    pub pt_widen_const: f64,
    /// Number of standard deviations of the q/pT uncertainty
    pub inv_pt_window_scale: f64,
    pub min_eta_half_width: f64,
    pub max_eta_half_width: f64,
    pub min_phi_half_width: f64,
    pub max_phi_half_width: f64,
    /// Minimum half-width in |q/pT| (1/GeV)
    pub min_inv_pt_half_width: f64,
    /// Beam spot position along z (cm)
    pub vertex_z: f64,
    /// Half-length of the origin window along z (cm)
    pub vertex_half_length: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            eta_window_scale: 3.0,
            phi_window_scale: 3.0,
            pt_widen_const: 2.0,
            inv_pt_window_scale: 3.0,
            min_eta_half_width: 0.05,
            max_eta_half_width: 0.5,
            min_phi_half_width: 0.1,
            max_phi_half_width: 0.5,
            min_inv_pt_half_width: 0.05,
            vertex_z: 0.0,
            vertex_half_length: 15.0,
        }
    }
}

/// Hit selection cuts for one technology
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnologyCut {
    /// Maximum chi-square contribution of a hit, `None` keeps every hit
    pub chi2_cut: Option<f64>,
    /// Drop all hits of layers above the occupancy threshold
    pub reject_high_occupancy: bool,
}

impl Default for TechnologyCut {
    fn default() -> Self {
        Self {
            chi2_cut: None,
            reject_high_occupancy: false,
        }
    }
}

/// Partial cut entry read from JSON; absent fields keep the default
#[derive(Deserialize)]
struct TechnologyCutPatch {
    /// `null` removes the cut
    #[serde(default, deserialize_with = "present")]
    chi2_cut: Option<Option<f64>>,
    #[serde(default)]
    reject_high_occupancy: Option<bool>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(Some)
}

/// Entries given in JSON are applied over the default cut table
fn merge_default_cuts<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<Technology, TechnologyCut>, D::Error>
where
    D: Deserializer<'de>,
{
    let patches = BTreeMap::<Technology, TechnologyCutPatch>::deserialize(deserializer)?;
    let mut cuts = HitQualityConfig::default().cuts;
    for (technology, patch) in patches {
        let cut = cuts.entry(technology).or_default();
        if let Some(chi2_cut) = patch.chi2_cut {
            cut.chi2_cut = chi2_cut;
        }
        if let Some(reject) = patch.reject_high_occupancy {
            cut.reject_high_occupancy = reject;
        }
    }
    Ok(cuts)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitQualityConfig {
    #[serde(deserialize_with = "merge_default_cuts")]
    pub cuts: BTreeMap<Technology, TechnologyCut>,
    /// A layer is "high occupancy" above this many compatible measurements
    pub occupancy_threshold: usize,
    /// Distance (cm) within which layer measurements count as compatible
    pub occupancy_window: f64,
}

impl Default for HitQualityConfig {
    fn default() -> Self {
        let mut cuts = BTreeMap::new();
        cuts.insert(Technology::Tracker, TechnologyCut::default());
        cuts.insert(
            Technology::DriftTube,
            TechnologyCut {
                chi2_cut: Some(25.0),
                reject_high_occupancy: false,
            },
        );
        cuts.insert(
            Technology::CathodeStripChamber,
            TechnologyCut {
                chi2_cut: Some(40.0),
                reject_high_occupancy: true,
            },
        );
        cuts.insert(
            Technology::ResistivePlateChamber,
            TechnologyCut {
                chi2_cut: Some(1000.0),
                reject_high_occupancy: false,
            },
        );
        Self {
            cuts,
            occupancy_threshold: 3,
            occupancy_window: 20.0,
        }
    }
}

impl HitQualityConfig {
    /// Cuts for a technology; technologies missing from the table keep all hits
    pub fn cut(&self, technology: Technology) -> TechnologyCut {
        self.cuts.get(&technology).copied().unwrap_or_default()
    }

    /// Set the chi-square cuts of the three muon technologies
    pub fn with_muon_chi2_cuts(mut self, dt: f64, csc: f64, rpc: f64) -> Self {
        for (technology, cut) in [
            (Technology::DriftTube, dt),
            (Technology::CathodeStripChamber, csc),
            (Technology::ResistivePlateChamber, rpc),
        ] {
            self.cuts.entry(technology).or_default().chi2_cut = Some(cut);
        }
        self
    }

    /// Same chi-square cut for every technology, tracker included
    pub fn with_uniform_chi2_cut(mut self, cut: f64) -> Self {
        for technology in Technology::ALL {
            self.cuts.entry(technology).or_default().chi2_cut = Some(cut);
        }
        self
    }

    pub fn with_occupancy_threshold(mut self, threshold: usize) -> Self {
        self.occupancy_threshold = threshold;
        self
    }
}

/// Muon hits added to the tracker hits for the first refit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuonHitsOption {
    TrackerOnly,
    FirstStation,
    #[default]
    AllStations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub region: RegionConfig,
    /// Minimum tracker track pT (GeV)
    pub pt_cut: f64,
    /// Optional chi-square cut on the standalone/tracker parameter match
    pub match_chi2_cut: Option<f64>,
    /// Collections at least this large are pre-binned in an (eta, phi) grid
    pub grid_min_tracks: usize,
    pub grid_cell_size: f64,
    pub hit_quality: HitQualityConfig,
    pub muon_hits_option: MuonHitsOption,
    pub direction: PropagationDirection,
    pub min_hits_to_refit: usize,
    /// Maximum accepted score (-ln P)
    pub prob_cut: f64,
    /// Minimum valid hits of a selected trajectory
    pub hit_threshold: usize,
    /// Evaluate candidates on the rayon pool
    pub parallel: bool,
    /// Let each tracker track end up in at most one combined muon per event
    pub resolve_shared_tracks: bool,
    pub fitter: FitterConfig,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            region: RegionConfig::default(),
            pt_cut: 1.0,
            match_chi2_cut: None,
            grid_min_tracks: 64,
            grid_cell_size: 0.1,
            hit_quality: HitQualityConfig::default(),
            muon_hits_option: MuonHitsOption::default(),
            direction: PropagationDirection::InsideOut,
            min_hits_to_refit: 3,
            prob_cut: 30.0,
            hit_threshold: 0,
            parallel: true,
            resolve_shared_tracks: false,
            fitter: FitterConfig::default(),
        }
    }
}

impl BuilderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: BuilderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        log::info!("Loading builder configuration from {}", path.as_ref().display());
        Self::from_json_str(&contents)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        let r = &self.region;
        let positive = [
            ("region.eta_window_scale", r.eta_window_scale),
            ("region.phi_window_scale", r.phi_window_scale),
            ("region.inv_pt_window_scale", r.inv_pt_window_scale),
            ("region.vertex_half_length", r.vertex_half_length),
            ("grid_cell_size", self.grid_cell_size),
            ("hit_quality.occupancy_window", self.hit_quality.occupancy_window),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(BuildError::config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if r.pt_widen_const < 0.0 || !r.pt_widen_const.is_finite() {
            return Err(BuildError::config("region.pt_widen_const must be >= 0"));
        }
        let widths = [
            ("region.min_eta_half_width", r.min_eta_half_width),
            ("region.max_eta_half_width", r.max_eta_half_width),
            ("region.min_phi_half_width", r.min_phi_half_width),
            ("region.max_phi_half_width", r.max_phi_half_width),
            ("region.min_inv_pt_half_width", r.min_inv_pt_half_width),
        ];
        for (name, value) in widths {
            if !(value.is_finite() && value >= 0.0) {
                return Err(BuildError::config(format!(
                    "{} must be finite and >= 0, got {}",
                    name, value
                )));
            }
        }
        if r.min_eta_half_width > r.max_eta_half_width
            || r.min_phi_half_width > r.max_phi_half_width
        {
            return Err(BuildError::config(
                "region minimum half-widths must not exceed the maxima",
            ));
        }
        if let Some((technology, _)) = self
            .hit_quality
            .cuts
            .iter()
            .find(|(_, cut)| cut.chi2_cut.map(|c| c.is_nan() || c < 0.0).unwrap_or(false))
        {
            return Err(BuildError::config(format!(
                "chi2 cut for {} must be >= 0",
                technology
            )));
        }
        if self.prob_cut.is_nan() {
            return Err(BuildError::config("prob_cut must be a number"));
        }
        if self.min_hits_to_refit == 0 {
            log::warn!("min_hits_to_refit = 0, empty hit sets are rejected by the filter anyway");
        }
        Ok(())
    }

    /// Convenience for the standard muon chi-square cuts
    pub fn with_muon_chi2_cuts(mut self, dt: f64, csc: f64, rpc: f64) -> Self {
        self.hit_quality = self.hit_quality.with_muon_chi2_cuts(dt, csc, rpc);
        self
    }
}
