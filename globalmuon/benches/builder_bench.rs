use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use globalmuon::{BuilderConfig, EventContext, GlobalMuonTrajectoryBuilder, TrajectoryBuilder};
use muontrack::track::diagonal_covariance;
use muontrack::{
    DetId, GlobalPoint, Hit, HitRef, Provenance, Technology, Track, TrackParameters,
};
use rand::prelude::*;

const FIELD_TESLA: f64 = 3.8;

fn helix_hit(det_id: DetId, params: &TrackParameters, radius: f64) -> HitRef {
    let slope = -0.0015 * FIELD_TESLA * params.theta().sin() * params.q_over_pt();
    Hit::new(
        det_id,
        GlobalPoint::from_polar(radius, params.eta, params.phi + slope * radius),
        [0.01, 0.02],
    )
    .into_ref()
}

fn tracker_track(id: u32, params: TrackParameters) -> Track {
    let hits = (1..=8)
        .map(|l| helix_hit(DetId::tracker(l, id as u16), &params, 4.0 + 13.0 * l as f64))
        .collect();
    Track::new(
        id,
        Provenance::Tracker,
        params,
        diagonal_covariance([1e-4, 1e-3, 1e-3, 1e-2, 1e-2]),
        hits,
    )
}

/// A muon plus `num_tracks - 1` random tracker tracks, a few of them close
fn generate_event(num_tracks: usize) -> (Track, Vec<Track>) {
    let mut rng = thread_rng();
    let muon = TrackParameters::new(1, 25.0, 0.6, 0.9);

    let mut tracks = vec![tracker_track(0, muon)];
    for id in 1..num_tracks as u32 {
        let params = if id % 20 == 0 {
            TrackParameters::new(
                1,
                muon.pt * rng.gen_range(0.9..1.1),
                muon.eta + rng.gen_range(-0.04..0.04),
                muon.phi + rng.gen_range(-0.08..0.08),
            )
        } else {
            TrackParameters::new(
                if rng.gen_bool(0.5) { 1 } else { -1 },
                rng.gen_range(0.8..40.0),
                rng.gen_range(-2.5..2.5),
                rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI),
            )
        };
        tracks.push(tracker_track(id, params));
    }

    let muon_hits = (1..=4)
        .map(|s| {
            helix_hit(
                DetId::muon(Technology::DriftTube, s, 1, 0),
                &muon,
                380.0 + 90.0 * s as f64,
            )
        })
        .collect();
    let standalone = Track::new(
        10_000,
        Provenance::Standalone,
        muon,
        diagonal_covariance([5e-3, 2e-2, 2e-2, 1.0, 5.0]),
        muon_hits,
    );
    (standalone, tracks)
}

fn bench_build_best(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_best");
    for num_tracks in [20, 200, 1000] {
        let (standalone, tracks) = generate_event(num_tracks);
        for parallel in [false, true] {
            let config = BuilderConfig {
                parallel,
                ..BuilderConfig::default()
            };
            let builder = match GlobalMuonTrajectoryBuilder::from_config(config) {
                Ok(builder) => builder,
                Err(e) => panic!("invalid bench configuration: {}", e),
            };
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, num_tracks), &tracks, |b, tracks| {
                b.iter(|| {
                    let event = EventContext::new(black_box(tracks));
                    builder.build_best(black_box(&standalone), &event).ok()
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_build_best);
criterion_main!(benches);
