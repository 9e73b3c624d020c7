//! Detector identifiers and global coordinates
//!
//! A `DetId` packs the detector, subdetector, station, layer and sensor
//! into 32 bits so that technology and layer membership can be decoded
//! without a geometry service:
//!
//! ```text
//!  31..28   27..25   24..20    19..12   11..0
//!  detector subdet   station   layer    sensor
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

const DETECTOR_SHIFT: u32 = 28;
const SUBDET_SHIFT: u32 = 25;
const STATION_SHIFT: u32 = 20;
const LAYER_SHIFT: u32 = 12;

const DETECTOR_MASK: u32 = 0xF;
const SUBDET_MASK: u32 = 0x7;
const STATION_MASK: u32 = 0x1F;
const LAYER_MASK: u32 = 0xFF;
const SENSOR_MASK: u32 = 0xFFF;

const DETECTOR_TRACKER: u32 = 1;
const DETECTOR_MUON: u32 = 2;

/// Physical measurement type of a detection layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Technology {
    Tracker,
    DriftTube,
    CathodeStripChamber,
    ResistivePlateChamber,
}

impl Technology {
    pub const ALL: [Technology; 4] = [
        Technology::Tracker,
        Technology::DriftTube,
        Technology::CathodeStripChamber,
        Technology::ResistivePlateChamber,
    ];

    pub fn is_muon(&self) -> bool {
        !matches!(self, Technology::Tracker)
    }

    fn subdet_code(&self) -> u32 {
        match self {
            Technology::Tracker => 0,
            Technology::DriftTube => 1,
            Technology::CathodeStripChamber => 2,
            Technology::ResistivePlateChamber => 3,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Technology::Tracker => "TK",
            Technology::DriftTube => "DT",
            Technology::CathodeStripChamber => "CSC",
            Technology::ResistivePlateChamber => "RPC",
        }
    }
}

impl fmt::Display for Technology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Packed detector identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DetId(pub u32);

impl DetId {
    /// Identifier of a tracker sensor in the given layer
    pub fn tracker(layer: u8, sensor: u16) -> Self {
        DetId(
            (DETECTOR_TRACKER << DETECTOR_SHIFT)
                | ((layer as u32 & LAYER_MASK) << LAYER_SHIFT)
                | (sensor as u32 & SENSOR_MASK),
        )
    }

    /// Identifier of a muon chamber sensor.
    ///
    /// `technology` must be one of the muon technologies; a tracker
    /// technology falls back to [`DetId::tracker`].
    pub fn muon(technology: Technology, station: u8, layer: u8, sensor: u16) -> Self {
        if !technology.is_muon() {
            return DetId::tracker(layer, sensor);
        }
        DetId(
            (DETECTOR_MUON << DETECTOR_SHIFT)
                | ((technology.subdet_code() & SUBDET_MASK) << SUBDET_SHIFT)
                | ((station as u32 & STATION_MASK) << STATION_SHIFT)
                | ((layer as u32 & LAYER_MASK) << LAYER_SHIFT)
                | (sensor as u32 & SENSOR_MASK),
        )
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Decoded technology, `None` for an unknown detector code
    pub fn technology(&self) -> Option<Technology> {
        match (self.0 >> DETECTOR_SHIFT) & DETECTOR_MASK {
            DETECTOR_TRACKER => Some(Technology::Tracker),
            DETECTOR_MUON => match (self.0 >> SUBDET_SHIFT) & SUBDET_MASK {
                1 => Some(Technology::DriftTube),
                2 => Some(Technology::CathodeStripChamber),
                3 => Some(Technology::ResistivePlateChamber),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_muon(&self) -> bool {
        self.technology().map(|t| t.is_muon()).unwrap_or(false)
    }

    /// Muon station (1-based), 0 for tracker sensors
    pub fn station(&self) -> u8 {
        ((self.0 >> STATION_SHIFT) & STATION_MASK) as u8
    }

    pub fn layer(&self) -> u8 {
        ((self.0 >> LAYER_SHIFT) & LAYER_MASK) as u8
    }

    /// Layer-level identifier: all sensors of one detection layer share it
    pub fn layer_key(&self) -> u32 {
        self.0 & !SENSOR_MASK
    }
}

impl fmt::Display for DetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.technology() {
            Some(tech) => write!(
                f,
                "{}[st={} ly={} id={:#010x}]",
                tech,
                self.station(),
                self.layer(),
                self.0
            ),
            None => write!(f, "Unknown[{:#010x}]", self.0),
        }
    }
}

/// Point in the global frame (cm)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl GlobalPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build from cylindrical coordinates
    pub fn from_cylindrical(perp: f64, phi: f64, z: f64) -> Self {
        Self {
            x: perp * phi.cos(),
            y: perp * phi.sin(),
            z,
        }
    }

    /// Build from distance to origin and (eta, phi) direction
    pub fn from_polar(mag: f64, eta: f64, phi: f64) -> Self {
        let theta = eta_to_theta(eta);
        Self::from_cylindrical(mag * theta.sin(), phi, mag * theta.cos())
    }

    pub fn perp(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn mag(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn theta(&self) -> f64 {
        self.perp().atan2(self.z)
    }

    pub fn eta(&self) -> f64 {
        theta_to_eta(self.theta())
    }

    pub fn distance(&self, other: &GlobalPoint) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl fmt::Display for GlobalPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

pub fn eta_to_theta(eta: f64) -> f64 {
    2.0 * (-eta).exp().atan()
}

pub fn theta_to_eta(theta: f64) -> f64 {
    -(theta / 2.0).tan().ln()
}

/// Wrap an angle difference into (-pi, pi]
pub fn delta_phi(a: f64, b: f64) -> f64 {
    let mut d = (a - b) % std::f64::consts::TAU;
    if d > std::f64::consts::PI {
        d -= std::f64::consts::TAU;
    } else if d <= -std::f64::consts::PI {
        d += std::f64::consts::TAU;
    }
    d
}
