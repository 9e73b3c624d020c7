/// Worker pool for processing a stream of events
/// Each worker runs a full event through the processor; jobs and results
/// travel over bounded channels so a slow consumer throttles the producer
use crate::builder::EventContext;
use crate::error::{BuildError, Result};
use crate::event::{EventMuons, EventProcessor};
use crossbeam::channel::{bounded, Receiver, Sender};
use muontrack::{HitRef, Track, TrajectoryFitter};
use std::thread;
use std::time::{Duration, Instant};

pub struct EventJob {
    pub event_id: u64,
    pub standalone_tracks: Vec<Track>,
    pub tracker_tracks: Vec<Track>,
    pub muon_measurements: Vec<HitRef>,
    /// Time allowed from the start of processing
    pub budget: Option<Duration>,
}

impl EventJob {
    pub fn new(event_id: u64, standalone_tracks: Vec<Track>, tracker_tracks: Vec<Track>) -> Self {
        Self {
            event_id,
            standalone_tracks,
            tracker_tracks,
            muon_measurements: Vec::new(),
            budget: None,
        }
    }
}

pub struct EventResult {
    pub event_id: u64,
    pub muons: EventMuons,
    pub latency_ms: f32,
}

/// Pool of workers running the event processor
pub struct EventWorkerPool {
    job_tx: Option<Sender<EventJob>>,
    result_rx: Receiver<EventResult>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl EventWorkerPool {
    /// Create a new event worker pool
    pub fn new<F>(num_workers: usize, processor: EventProcessor<F>) -> Self
    where
        F: TrajectoryFitter + 'static,
    {
        let num_workers = num_workers.max(1);
        let (job_tx, job_rx) = bounded::<EventJob>(num_workers * 2);
        let (result_tx, result_rx) = bounded::<EventResult>(num_workers * 2);

        let mut workers = Vec::new();

        for worker_id in 0..num_workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let processor = processor.clone();

            let handle = thread::spawn(move || {
                log::debug!("Event worker {} started", worker_id);

                while let Ok(job) = job_rx.recv() {
                    let start = Instant::now();

                    let mut event = EventContext::new(&job.tracker_tracks)
                        .with_measurements(&job.muon_measurements);
                    if let Some(budget) = job.budget {
                        event = event.with_deadline(start + budget);
                    }
                    let muons = processor.process(&job.standalone_tracks, &event);

                    let latency = start.elapsed().as_secs_f32() * 1000.0;

                    let result = EventResult {
                        event_id: job.event_id,
                        muons,
                        latency_ms: latency,
                    };

                    if result_tx.send(result).is_err() {
                        break;
                    }
                }

                log::debug!("Event worker {} stopped", worker_id);
            });

            workers.push(handle);
        }

        log::info!("Event worker pool started with {} workers", num_workers);

        Self {
            job_tx: Some(job_tx),
            result_rx,
            workers,
        }
    }

    /// Submit an event, blocking while the job queue is full
    pub fn submit(&self, job: EventJob) -> Result<()> {
        let tx = self
            .job_tx
            .as_ref()
            .ok_or_else(|| BuildError::config("event worker pool is shut down"))?;
        tx.send(job)
            .map_err(|_| BuildError::config("event workers have stopped"))
    }

    /// Submit an event (non-blocking)
    pub fn try_submit(&self, job: EventJob) -> bool {
        self.job_tx
            .as_ref()
            .map(|tx| tx.try_send(job).is_ok())
            .unwrap_or(false)
    }

    /// Wait for the next result, `None` once every worker has stopped
    pub fn recv_result(&self) -> Option<EventResult> {
        self.result_rx.recv().ok()
    }

    /// Get next result (non-blocking)
    pub fn try_get_result(&self) -> Option<EventResult> {
        self.result_rx.try_recv().ok()
    }

    /// Get available capacity (approximate)
    pub fn has_capacity(&self) -> bool {
        self.job_tx
            .as_ref()
            .map(|tx| tx.len() < tx.capacity().unwrap_or(0) / 2)
            .unwrap_or(false)
    }

    /// Stop accepting jobs, drain the remaining results and join the workers
    pub fn shutdown(mut self) -> Vec<EventResult> {
        self.job_tx.take();
        let mut remaining = Vec::new();
        let workers = std::mem::take(&mut self.workers);
        // Workers block on a full result queue, so drain while joining
        for handle in workers {
            while !handle.is_finished() {
                match self.result_rx.recv_timeout(Duration::from_millis(10)) {
                    Ok(result) => remaining.push(result),
                    Err(_) => continue,
                }
            }
            if handle.join().is_err() {
                log::warn!("Event worker panicked");
            }
        }
        remaining.extend(self.result_rx.try_iter());
        log::info!("Event worker pool stopped");
        remaining
    }
}

impl Drop for EventWorkerPool {
    fn drop(&mut self) {
        self.job_tx.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GlobalMuonTrajectoryBuilder;
    use crate::config::BuilderConfig;
    use muontrack::track::diagonal_covariance;
    use muontrack::{
        DetId, GlobalPoint, Hit, KalmanTrajectoryFitter, Provenance, Technology, TrackParameters,
    };
    use std::sync::Arc;

    fn hit(det_id: DetId, radius: f64) -> HitRef {
        Hit::new(det_id, GlobalPoint::from_polar(radius, 0.0, 0.5), [0.01, 0.05]).into_ref()
    }

    fn event(event_id: u64) -> EventJob {
        let tracker = Track::new(
            0,
            Provenance::Tracker,
            TrackParameters::new(1, 1000.0, 0.0, 0.5),
            diagonal_covariance([1e-4, 1e-3, 1e-3, 1e-2, 1e-2]),
            (1..=4)
                .map(|l| hit(DetId::tracker(l, 0), 20.0 * l as f64))
                .collect(),
        );
        let standalone = Track::new(
            1,
            Provenance::Standalone,
            TrackParameters::new(1, 1000.0, 0.0, 0.5),
            diagonal_covariance([1e-4, 1e-3, 1e-3, 1e-2, 1e-2]),
            (1..=3)
                .map(|s| {
                    hit(
                        DetId::muon(Technology::DriftTube, s, 1, 0),
                        400.0 + 100.0 * s as f64,
                    )
                })
                .collect(),
        );
        EventJob::new(event_id, vec![standalone], vec![tracker])
    }

    #[test]
    fn test_pool_processes_all_events() {
        let builder =
            GlobalMuonTrajectoryBuilder::from_config(BuilderConfig::default()).unwrap();
        let processor = EventProcessor::<KalmanTrajectoryFitter>::new(Arc::new(builder));
        let pool = EventWorkerPool::new(2, processor);

        for id in 0..6 {
            pool.submit(event(id)).unwrap();
        }
        let mut ids = Vec::new();
        while ids.len() < 6 {
            let result = pool.recv_result().unwrap();
            assert_eq!(result.muons.muons.len(), 1);
            assert!(result.muons.muons[0].is_some());
            ids.push(result.event_id);
        }
        ids.sort_unstable();
        assert_eq!(ids, (0..6).collect::<Vec<_>>());
        assert!(pool.shutdown().is_empty());
    }

    #[test]
    fn test_zero_budget_yields_no_muons() {
        let builder =
            GlobalMuonTrajectoryBuilder::from_config(BuilderConfig::default()).unwrap();
        let pool = EventWorkerPool::new(1, EventProcessor::new(Arc::new(builder)));
        let mut job = event(7);
        job.budget = Some(Duration::ZERO);
        pool.submit(job).unwrap();
        let remaining = pool.shutdown();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].event_id, 7);
        assert_eq!(remaining[0].muons.found(), 0);
    }
}
