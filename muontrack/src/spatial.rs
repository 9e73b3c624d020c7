//! Spatial indexing in (eta, phi) for large track collections

use std::collections::HashMap;
use std::f64::consts::{PI, TAU};

/// Uniform (eta, phi) grid with phi bins wrapping around
#[derive(Debug, Clone)]
pub struct EtaPhiGrid {
    cell_size: f64,
    phi_bins: i64,
    grid: HashMap<(i64, i64), Vec<usize>>,
}

impl EtaPhiGrid {
    /// Create a new grid with the specified cell size (in both eta and phi)
    pub fn new(cell_size: f64) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            0.1
        };
        Self {
            cell_size,
            phi_bins: (TAU / cell_size).ceil().max(1.0) as i64,
            grid: HashMap::new(),
        }
    }

    fn eta_bin(&self, eta: f64) -> i64 {
        (eta / self.cell_size).floor() as i64
    }

    fn phi_bin(&self, phi: f64) -> i64 {
        (((phi + PI) / self.cell_size).floor() as i64).rem_euclid(self.phi_bins)
    }

    /// Insert an entry at (eta, phi); non-finite coordinates are ignored
    pub fn insert(&mut self, eta: f64, phi: f64, id: usize) {
        if !eta.is_finite() || !phi.is_finite() {
            return;
        }
        let key = (self.eta_bin(eta), self.phi_bin(phi));
        self.grid.entry(key).or_default().push(id);
    }

    /// Entries in the cells overlapping the window, in ascending id order
    pub fn query(&self, eta: f64, phi: f64, half_eta: f64, half_phi: f64) -> Vec<usize> {
        if !eta.is_finite() || !phi.is_finite() {
            return Vec::new();
        }

        let eta_min = self.eta_bin(eta - half_eta);
        let eta_max = self.eta_bin(eta + half_eta);

        let phi_cells: Vec<i64> = if 2.0 * half_phi + 3.0 * self.cell_size >= TAU {
            (0..self.phi_bins).collect()
        } else {
            let lo = ((phi - half_phi + PI) / self.cell_size).floor() as i64;
            let hi = ((phi + half_phi + PI) / self.cell_size).floor() as i64;
            // One extra cell per side covers the partial last bin at the seam
            let mut cells: Vec<i64> = (lo - 1..=hi + 1)
                .map(|c| c.rem_euclid(self.phi_bins))
                .collect();
            cells.sort_unstable();
            cells.dedup();
            cells
        };

        let mut candidates = Vec::new();
        for e in eta_min..=eta_max {
            for &p in &phi_cells {
                if let Some(ids) = self.grid.get(&(e, p)) {
                    candidates.extend(ids);
                }
            }
        }

        // Remove duplicates and restore insertion order
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }

    /// Clear all entries from the grid (reuse for next event)
    pub fn clear(&mut self) {
        for bucket in self.grid.values_mut() {
            bucket.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.grid.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_basic() {
        let mut grid = EtaPhiGrid::new(0.1);
        grid.insert(0.52, 1.05, 0);
        grid.insert(1.5, -2.0, 1);
        grid.insert(0.48, 0.95, 2);

        let results = grid.query(0.5, 1.0, 0.05, 0.1);
        assert_eq!(results, vec![0, 2]);
    }

    #[test]
    fn test_grid_phi_wrap() {
        let mut grid = EtaPhiGrid::new(0.1);
        grid.insert(0.0, PI - 0.02, 0);
        grid.insert(0.0, -PI + 0.02, 1);
        grid.insert(0.0, 0.0, 2);

        let results = grid.query(0.0, PI - 0.01, 0.05, 0.1);
        assert!(results.contains(&0));
        assert!(results.contains(&1));
        assert!(!results.contains(&2));
    }

    #[test]
    fn test_clear_and_ignore_nan() {
        let mut grid = EtaPhiGrid::new(0.2);
        grid.insert(f64::NAN, 0.0, 0);
        grid.insert(0.0, 0.0, 1);
        assert_eq!(grid.len(), 1);
        grid.clear();
        assert!(grid.is_empty());
    }
}
