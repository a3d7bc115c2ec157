//! Run orchestration: signal acquisition, displacement, classification and synthesis,
//! with supersession of stale runs.

use crate::classify::FeatureClassifier;
use crate::config::Config;
use crate::defects::{DefectStore, DefectThresholds, LabelTally};
use crate::displace::DisplacementEngine;
use crate::errors::ValidationError;
use crate::float_types::{EPSILON, Real};
use crate::mesh::WorkingMesh;
use crate::noise::NoiseField;
use crate::raycast::RaySampler;
use crate::seed::SeedStreamRegistry;
use crate::signal::CubeSignal;
use crate::topology::{OutputGeometry, TopologyBuilder};
use std::borrow::Cow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Seed key the noise signal of a run draws from.
pub const NOISE_KEY: &str = "noise";

/// Monotonic generation id shared between an [`Orchestrator`] and whoever requests runs.
///
/// Cloning shares the counter, so a new run can be requested from inside the iteration
/// callback of the one in flight.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Validate `config` and claim the next generation for it. Every run issued earlier is
    /// superseded from this point on.
    pub fn issue(&self, config: Config) -> Result<RunTicket, ValidationError> {
        config.validate()?;
        let generation = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunTicket { generation, config })
    }
}

/// A validated request for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTicket {
    generation: u64,
    config: Config,
}

impl RunTicket {
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run finished and its output was committed
    Completed,
    /// A newer run was requested; nothing was committed
    Superseded { at_iteration: u32 },
}

/// Everything a completed run hands to the render stage.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub generation: u64,
    pub config: Config,
    /// The displaced base mesh
    pub environment: WorkingMesh,
    pub features: OutputGeometry,
    /// Every defect recorded during displacement
    pub defects: DefectStore,
    pub cluster_count: usize,
    pub cluster_ratio: Real,
    /// Seed state after the noise build, absent for imported signals
    pub noise_state: Option<Real>,
    pub noise_tally: Option<LabelTally>,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    generations: GenerationCounter,
    output: Option<PipelineOutput>,
    stale_aborts: u64,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the generation counter of this orchestrator.
    pub fn generations(&self) -> GenerationCounter {
        self.generations.clone()
    }

    pub fn begin(&self, config: Config) -> Result<RunTicket, ValidationError> {
        self.generations.issue(config)
    }

    /// The output of the newest completed run.
    pub fn output(&self) -> Option<&PipelineOutput> {
        self.output.as_ref()
    }

    /// How many runs were discarded because a newer one had been requested.
    pub const fn stale_aborts(&self) -> u64 {
        self.stale_aborts
    }

    /// Begin and execute a run without observing its iterations.
    pub fn run(
        &mut self,
        config: Config,
        base_mesh: &WorkingMesh,
        imported_signal: Option<&CubeSignal>,
    ) -> Result<RunOutcome, ValidationError> {
        let ticket = self.begin(config)?;
        self.execute(ticket, base_mesh, imported_signal, |_| {})
    }

    /// Execute `ticket` against a copy of `base_mesh`.
    ///
    /// `on_iteration` is called with the remaining iteration count after every displacement
    /// iteration. The generation is checked right after each call; a superseded run returns
    /// without touching [`output`](Self::output).
    pub fn execute<F>(
        &mut self,
        ticket: RunTicket,
        base_mesh: &WorkingMesh,
        imported_signal: Option<&CubeSignal>,
        mut on_iteration: F,
    ) -> Result<RunOutcome, ValidationError>
    where
        F: FnMut(u32),
    {
        let RunTicket { generation, config } = ticket;
        if !self.generations.is_current(generation) {
            return Ok(self.abort(generation, config.iterations));
        }

        // 1) signal: fresh noise from a reset seed stream, or the imported one
        let (signal, noise_state, noise_tally) = if config.use_generated_signal {
            let mut seeds = SeedStreamRegistry::new(config.seed)?;
            seeds.reset(NOISE_KEY);
            let noise = NoiseField::new(config.resolution_cap as usize).build(&mut seeds, NOISE_KEY);
            (Cow::Owned(noise.signal), Some(noise.final_state), Some(noise.tally))
        } else {
            let imported = imported_signal.ok_or(ValidationError::MissingSignal)?;
            (cap_resolution(imported, config.resolution_cap as usize), None, None)
        };

        // 2) displacement
        let mut mesh = base_mesh.clone();
        let (center, radius) = mesh.bounding_sphere();
        if radius < EPSILON {
            return Err(ValidationError::DegenerateMesh);
        }
        let sampler = RaySampler::new(center, 2.0 * radius, config.face_cells);
        let thresholds = match signal.neutral_strength() {
            Some(neutral) => DefectThresholds::default().with_neutral(neutral),
            None => DefectThresholds::default(),
        };
        log::debug!("generation {generation}: neutral strength {}", thresholds.neutral);
        let mut engine =
            DisplacementEngine::new(config.iterations, sampler, thresholds, mesh.vertex_count());
        loop {
            let more = engine.step(&mut mesh, &signal);
            on_iteration(engine.current_iteration());
            if !self.generations.is_current(generation) {
                return Ok(self.abort(generation, engine.current_iteration()));
            }
            if !more {
                break;
            }
        }
        let defects = engine.finish(&mut mesh);

        // 3) classification and synthesis
        let classification = FeatureClassifier::new(config.max_segs, center).classify(&defects);
        let features = TopologyBuilder::new(center, radius).build(&classification.clusters);

        if !self.generations.is_current(generation) {
            return Ok(self.abort(generation, 0));
        }

        log::info!(
            "generation {generation}: {} defects, {} clusters, {} pos / {} neg solids",
            defects.len(),
            classification.clusters.len(),
            features.pos_count,
            features.neg_count
        );
        self.output = Some(PipelineOutput {
            generation,
            config,
            environment: mesh,
            features,
            defects,
            cluster_count: classification.clusters.len(),
            cluster_ratio: classification.cluster_ratio,
            noise_state,
            noise_tally,
        });
        Ok(RunOutcome::Completed)
    }

    fn abort(&mut self, generation: u64, at_iteration: u32) -> RunOutcome {
        self.stale_aborts += 1;
        log::info!(
            "generation {generation} superseded by {} at iteration {at_iteration}, discarded",
            self.generations.current()
        );
        RunOutcome::Superseded { at_iteration }
    }
}

/// Imported signals larger than `cap` are box-filtered down to it.
fn cap_resolution(signal: &CubeSignal, cap: usize) -> Cow<'_, CubeSignal> {
    if signal.size() <= cap {
        return Cow::Borrowed(signal);
    }
    let faces = signal.faces().iter().map(|f| f.downsample(cap)).collect();
    match CubeSignal::from_faces(faces) {
        Ok(capped) => Cow::Owned(capped),
        Err(_) => Cow::Borrowed(signal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Rgba;

    #[test]
    fn issuing_supersedes_earlier_tickets() {
        let counter = GenerationCounter::default();
        let a = counter.issue(Config::default()).unwrap();
        assert!(counter.is_current(a.generation()));
        let b = counter.clone().issue(Config::default()).unwrap();
        assert!(!counter.is_current(a.generation()));
        assert!(counter.is_current(b.generation()));
        assert!(b.generation() > a.generation());
    }

    #[test]
    fn invalid_config_claims_no_generation() {
        let orch = Orchestrator::new();
        let bad = Config {
            iterations: 0,
            ..Config::default()
        };
        assert_eq!(orch.begin(bad), Err(ValidationError::InvalidIterations(0)));
        let huge = Config {
            resolution_cap: 100_000,
            ..Config::default()
        };
        assert_eq!(orch.begin(huge), Err(ValidationError::InvalidResolution(100_000)));
        assert_eq!(orch.generations().current(), 0);
    }

    #[test]
    fn imported_signal_is_required_when_noise_is_off() {
        let mut orch = Orchestrator::new();
        let config = Config {
            use_generated_signal: false,
            ..Config::default()
        };
        let mesh = WorkingMesh::icosphere(1.0, 1);
        assert_eq!(
            orch.run(config, &mesh, None),
            Err(ValidationError::MissingSignal)
        );
        assert!(orch.output().is_none());
    }

    #[test]
    fn oversized_imports_are_capped() {
        let big = CubeSignal::uniform(32, Rgba::new(1, 2, 3, 255));
        assert_eq!(cap_resolution(&big, 8).size(), 8);
        assert!(matches!(cap_resolution(&big, 64), Cow::Borrowed(_)));
    }

    #[test]
    fn stale_ticket_is_dropped_before_work() {
        let mut orch = Orchestrator::new();
        let old = orch.begin(Config::default()).unwrap();
        let _new = orch.begin(Config::default()).unwrap();
        let mesh = WorkingMesh::icosphere(1.0, 1);
        let outcome = orch.execute(old, &mesh, None, |_| panic!("no iterations expected"));
        assert_eq!(outcome, Ok(RunOutcome::Superseded { at_iteration: 1 }));
        assert_eq!(orch.stale_aborts(), 1);
        assert!(orch.output().is_none());
    }
}
