use crate::config::Config;
use crate::defects::{Label, LabelTally};
use crate::mesh::WorkingMesh;
use crate::noise::NoiseField;
use crate::pipeline::{Orchestrator, PipelineOutput, RunOutcome};
use crate::seed::SeedStreamRegistry;
use crate::signal::{CubeFace, CubeSignal, FaceTexture, Rgba};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const GREY: Rgba = Rgba::new(128, 128, 128, 255);

fn run_once(config: Config, mesh: &WorkingMesh, signal: Option<&CubeSignal>) -> PipelineOutput {
    let mut orch = Orchestrator::new();
    assert_eq!(orch.run(config, mesh, signal), Ok(RunOutcome::Completed));
    orch.output().cloned().expect("committed output")
}

fn imported(resolution_cap: u32) -> Config {
    Config {
        use_generated_signal: false,
        resolution_cap,
        ..Config::default()
    }
}

// --------------------------------------------------------
//   Determinism
// --------------------------------------------------------

#[test]
fn noise_tiles_are_byte_identical_across_runs() {
    let build = || {
        let mut seeds = SeedStreamRegistry::new(0.5).unwrap();
        NoiseField::new(8).build(&mut seeds, "noise").signal
    };
    let a = build();
    assert_eq!(a, build());
    assert_eq!(a.size(), 8);
}

#[test]
fn pipeline_is_deterministic() {
    init_logging();
    let mesh = WorkingMesh::icosphere(3.0, 2);
    let config = Config {
        seed: 0.31,
        iterations: 3,
        resolution_cap: 16,
        ..Config::default()
    };
    let a = run_once(config.clone(), &mesh, None);
    let b = run_once(config, &mesh, None);
    assert_eq!(a.environment, b.environment);
    assert_eq!(a.features, b.features);
    assert_eq!(a.noise_state, b.noise_state);
    assert_eq!(a.noise_tally, b.noise_tally);
    assert_eq!(a.defects.len(), b.defects.len());
    assert_eq!(a.cluster_ratio, b.cluster_ratio);
}

// --------------------------------------------------------
//   Scenarios
// --------------------------------------------------------

#[test]
fn single_pass_stays_within_the_shell() {
    init_logging();
    let mesh = WorkingMesh::icosphere(2.0, 2);
    let (center, radius) = mesh.bounding_sphere();
    let config = Config {
        seed: 0.5,
        iterations: 1,
        use_generated_signal: true,
        resolution_cap: 8,
        ..Config::default()
    };
    let out = run_once(config, &mesh, None);

    assert_eq!(out.environment.vertex_count(), mesh.vertex_count());
    assert_eq!(out.environment.triangles(), mesh.triangles());
    for p in out.environment.positions() {
        let r = (p - center).norm();
        assert!(
            (0.5 * radius..=1.5 * radius).contains(&r),
            "vertex at {r} outside [{}, {}]",
            0.5 * radius,
            1.5 * radius
        );
    }
    assert!(out.noise_state.is_some());
    assert!(out.environment.colors().is_some());
}

#[test]
fn neutral_grey_produces_no_features() {
    init_logging();
    let mesh = WorkingMesh::icosphere(1.0, 2);
    let signal = CubeSignal::uniform(16, GREY);
    let out = run_once(imported(16), &mesh, Some(&signal));

    assert!(out.defects.is_empty());
    assert_eq!(out.cluster_count, 0);
    assert_eq!(out.cluster_ratio, 0.5);
    assert!(out.features.pos.is_placeholder());
    assert!(out.features.neg.is_placeholder());
    assert_eq!(out.features.pos_count + out.features.neg_count, 0);
    assert_eq!(out.noise_state, None);
}

#[test]
fn one_bright_face_yields_only_pos_defects_on_it() {
    init_logging();
    let mesh = WorkingMesh::icosphere(1.0, 3);
    let mut signal = CubeSignal::uniform(16, GREY);
    signal
        .set_face(CubeFace::PosX, FaceTexture::filled(16, Rgba::new(255, 255, 255, 255)))
        .unwrap();
    let out = run_once(imported(16), &mesh, Some(&signal));

    let ids = out.defects.face_ids();
    assert!(!ids.is_empty());
    for id in ids {
        assert_eq!(id.face, CubeFace::PosX);
        let bucket = out.defects.bucket(&id).unwrap();
        // white against the grey majority
        let expected = 2.0 / GREY.strength();
        assert!(
            bucket
                .iter()
                .all(|r| r.label == Label::Pos && (r.strength - expected).abs() < 1e-9)
        );
    }
    assert!(out.features.pos_count > 0);
    assert!(!out.features.pos.is_placeholder());
    assert!(out.features.neg.is_placeholder());
}

#[test]
fn generated_noise_yields_both_labels() {
    init_logging();
    let mesh = WorkingMesh::icosphere(2.0, 2);
    for seed in [0.2, 0.5, 0.9] {
        let config = Config {
            seed,
            resolution_cap: 16,
            ..Config::default()
        };
        let out = run_once(config, &mesh, None);

        let mut labels = LabelTally::default();
        for id in out.defects.face_ids() {
            for r in out.defects.bucket(&id).unwrap() {
                labels.add(r.label);
            }
        }
        assert!(labels.pos > 0, "seed {seed}: no pos defects");
        assert!(labels.neg > 0, "seed {seed}: no neg defects");
        assert!(labels.total() < out.environment.triangles().len());
        assert!(out.cluster_ratio > 0.0 && out.cluster_ratio < 1.0);
        assert!(out.features.pos_count > 0, "seed {seed}: no pos solids");
        assert!(!out.features.pos.is_placeholder(), "seed {seed}");
        assert!(!out.features.neg.is_placeholder(), "seed {seed}");
    }
}

#[test]
fn imported_signal_is_capped_to_the_configured_resolution() {
    let mesh = WorkingMesh::icosphere(1.0, 1);
    let signal = CubeSignal::uniform(64, GREY);
    let out = run_once(imported(8), &mesh, Some(&signal));
    assert!(out.defects.is_empty());
}

// --------------------------------------------------------
//   Cancellation
// --------------------------------------------------------

#[test]
fn newer_request_supersedes_the_run_in_flight() {
    init_logging();
    let mesh = WorkingMesh::icosphere(2.0, 2);
    let config_a = Config {
        seed: 0.2,
        iterations: 3,
        resolution_cap: 16,
        ..Config::default()
    };
    let config_b = Config {
        seed: 0.9,
        iterations: 2,
        resolution_cap: 16,
        ..Config::default()
    };

    let mut orch = Orchestrator::new();
    let counter = orch.generations();
    let ticket_a = orch.begin(config_a).unwrap();

    // run B is requested while A is between its first and second iteration
    let mut ticket_b = None;
    let outcome_a = orch.execute(ticket_a, &mesh, None, |_| {
        if ticket_b.is_none() {
            ticket_b = Some(counter.issue(config_b.clone()).unwrap());
        }
    });
    assert_eq!(outcome_a, Ok(RunOutcome::Superseded { at_iteration: 2 }));
    assert_eq!(orch.stale_aborts(), 1);
    assert!(orch.output().is_none());

    let ticket_b = ticket_b.expect("B was issued");
    let generation_b = ticket_b.generation();
    assert_eq!(
        orch.execute(ticket_b, &mesh, None, |_| {}),
        Ok(RunOutcome::Completed)
    );

    let out = orch.output().expect("B committed");
    assert_eq!(out.generation, generation_b);
    assert_eq!(out.config, config_b);

    // identical to B run on its own: nothing of A leaked in
    let alone = run_once(config_b, &mesh, None);
    assert_eq!(out.environment, alone.environment);
    assert_eq!(out.features, alone.features);
    assert_eq!(out.noise_state, alone.noise_state);
}

#[test]
fn completed_output_survives_a_later_stale_run() {
    let mesh = WorkingMesh::icosphere(1.0, 1);
    let mut orch = Orchestrator::new();
    assert_eq!(
        orch.run(Config::default(), &mesh, None),
        Ok(RunOutcome::Completed)
    );
    let committed = orch.output().map(|o| o.generation);

    let stale = orch.begin(Config { seed: 0.7, ..Config::default() }).unwrap();
    let _newer = orch.begin(Config::default()).unwrap();
    assert!(matches!(
        orch.execute(stale, &mesh, None, |_| {}),
        Ok(RunOutcome::Superseded { .. })
    ));
    assert_eq!(orch.output().map(|o| o.generation), committed);
    assert_eq!(orch.stale_aborts(), 1);
}
