use std::fs;
use std::path::Path;

use renderer::{
    discover_sources, wrap_program, ChannelInput, ChannelSource, CompositeDraw, FixedTimeSource,
    FrameError, FrameExecutor, FramePlan, LayerBackend, LayerOptions, LayerRegistry, LayerSource,
    ProgramError, ProgramLayout, ProgramSource, RegistryError, ShaderInterface, SurfaceSize,
    TargetError, TargetRef, TargetSpec, UniformLocation, FRAME_UNIFORM, RESOLUTION_UNIFORM,
    TIME_UNIFORM,
};
use tempfile::TempDir;

#[derive(Debug)]
struct MockProgram {
    id: usize,
    interface: ShaderInterface,
    linked_channels: Vec<usize>,
}

#[derive(Debug)]
struct MockTarget {
    layer: usize,
    slot: usize,
    size: SurfaceSize,
}

/// Records every call the registry and executor make.
#[derive(Default)]
struct MockBackend {
    compiled: usize,
    targets_created: Vec<(usize, usize)>,
    surface_resizes: Vec<SurfaceSize>,
    submitted: Vec<FramePlan>,
    /// Answer every uniform lookup, as a driver with stray uniforms would.
    answer_every_lookup: bool,
    /// Report every target as incomplete.
    incomplete_targets: bool,
    /// Refuse to create or resize targets beyond this edge length.
    max_target_dimension: Option<u32>,
    fail_next_submit: Option<FrameError>,
}

impl LayerBackend for MockBackend {
    type Program = MockProgram;
    type Target = MockTarget;

    fn compile_program(&mut self, source: &ProgramSource<'_>) -> Result<MockProgram, ProgramError> {
        if source.fragment.contains("#error") {
            return Err(ProgramError::Compile {
                layer: source.layer,
                stage: renderer::StageKind::Fragment,
                log: "0:1: '#error' : forced".to_string(),
            });
        }
        let wrapped = wrap_program(source);
        self.compiled += 1;
        Ok(MockProgram {
            id: self.compiled,
            interface: wrapped.interface,
            linked_channels: Vec::new(),
        })
    }

    fn uniform_location(&self, program: &MockProgram, name: &str) -> Option<UniformLocation> {
        (self.answer_every_lookup || program.interface.declares(name)).then_some(UniformLocation(0))
    }

    fn link_program(
        &mut self,
        program: &mut MockProgram,
        layout: &ProgramLayout<'_>,
    ) -> Result<(), ProgramError> {
        program.linked_channels = layout.channels.iter().collect();
        Ok(())
    }

    fn create_target(&mut self, spec: &TargetSpec) -> Result<MockTarget, TargetError> {
        self.check_size(spec)?;
        self.targets_created.push((spec.layer, spec.slot));
        Ok(MockTarget {
            layer: spec.layer,
            slot: spec.slot,
            size: spec.size,
        })
    }

    fn check_target(&self, target: &MockTarget) -> Result<(), TargetError> {
        if self.incomplete_targets {
            return Err(TargetError::Incomplete {
                layer: target.layer,
                slot: target.slot,
                reason: "missing colour attachment".to_string(),
            });
        }
        Ok(())
    }

    fn resize_target(
        &mut self,
        target: &mut MockTarget,
        spec: &TargetSpec,
    ) -> Result<(), TargetError> {
        self.check_size(spec)?;
        target.size = spec.size;
        Ok(())
    }

    fn resize_surface(&mut self, size: SurfaceSize) {
        self.surface_resizes.push(size);
    }

    fn submit_frame(
        &mut self,
        _layers: &[renderer::Layer<MockProgram, MockTarget>],
        plan: &FramePlan,
    ) -> Result<(), FrameError> {
        self.submitted.push(plan.clone());
        match self.fail_next_submit.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MockBackend {
    fn check_size(&self, spec: &TargetSpec) -> Result<(), TargetError> {
        match self.max_target_dimension {
            Some(limit) if spec.size.width > limit || spec.size.height > limit => {
                Err(TargetError::TooLarge {
                    layer: spec.layer,
                    slot: spec.slot,
                    size: spec.size,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }
}

fn fragment(channels: &[usize]) -> String {
    let mut source = String::from("#version 120\nuniform vec2 u_resolution;\nuniform float u_time;\n");
    for channel in channels {
        source.push_str(&format!("uniform sampler2D u_sampler{channel};\n"));
    }
    source.push_str("void main() {\n    gl_FragColor = vec4(0.0);\n}\n");
    source
}

fn write_layers(dir: &Path, layers: &[&[usize]]) {
    for (index, channels) in layers.iter().enumerate() {
        fs::write(dir.join(format!("shader{index}.frag")), fragment(channels)).unwrap();
    }
}

fn build(
    layers: &[&[usize]],
    size: SurfaceSize,
) -> (TempDir, MockBackend, LayerRegistry<MockBackend>) {
    let dir = TempDir::new().unwrap();
    write_layers(dir.path(), layers);
    let sources = discover_sources(dir.path()).unwrap();
    let mut backend = MockBackend::default();
    let registry = LayerRegistry::build(&mut backend, &sources, &[], size).unwrap();
    (dir, backend, registry)
}

fn executor() -> FrameExecutor {
    FrameExecutor::new(Box::new(FixedTimeSource::new(1.5)))
}

#[test]
fn discovery_stops_at_first_gap() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("shader0.frag"), fragment(&[])).unwrap();
    fs::write(dir.path().join("shader1.frag"), fragment(&[1])).unwrap();
    fs::write(dir.path().join("shader1.vert"), "void main() { gl_Position = gl_Vertex; }").unwrap();
    fs::write(dir.path().join("shader3.frag"), fragment(&[])).unwrap();

    let sources = discover_sources(dir.path()).unwrap();
    let indices: Vec<usize> = sources.iter().map(|source| source.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(!sources[0].has_custom_vertex());
    assert!(sources[1].has_custom_vertex());
}

#[test]
fn only_feedback_layers_get_targets() {
    let (_dir, backend, registry) = build(&[&[0], &[], &[0, 2]], SurfaceSize::new(800, 600));

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.feedback_count(), 2);
    assert!(registry.layer(0).unwrap().targets().is_some());
    assert!(registry.layer(1).unwrap().targets().is_none());
    assert!(registry.layer(2).unwrap().targets().is_some());
    assert_eq!(backend.targets_created, vec![(0, 0), (0, 1), (2, 0), (2, 1)]);

    for layer in registry.layers() {
        if let Some(targets) = layer.targets() {
            for target in targets.iter() {
                assert_eq!(target.layer, layer.index());
                assert_eq!(target.size, SurfaceSize::new(800, 600));
            }
            assert_eq!(targets.front().slot, targets.front_slot());
        }
    }
}

#[test]
fn channels_never_point_above_their_layer() {
    let dir = TempDir::new().unwrap();
    write_layers(dir.path(), &[&[0], &[0, 5]]);
    let sources = discover_sources(dir.path()).unwrap();

    let mut backend = MockBackend {
        answer_every_lookup: true,
        ..MockBackend::default()
    };
    let registry =
        LayerRegistry::build(&mut backend, &sources, &[], SurfaceSize::new(64, 64)).unwrap();

    for layer in registry.layers() {
        assert!(layer.channels().iter().all(|channel| channel <= layer.index()));
        assert_eq!(
            layer.program().linked_channels,
            layer.channels().iter().collect::<Vec<_>>()
        );
    }
    assert_eq!(
        registry.layer(1).unwrap().channels().iter().collect::<Vec<_>>(),
        vec![0, 1]
    );

    // Without stray uniforms the forward declaration is simply gone.
    let (_dir, _backend, registry) = build(&[&[0], &[0, 5]], SurfaceSize::new(64, 64));
    assert!(!registry.layer(1).unwrap().program().interface.channels.contains(&5));
    assert_eq!(
        registry.layer(1).unwrap().channels().iter().collect::<Vec<_>>(),
        vec![0]
    );
}

#[test]
fn two_frames_restore_the_front_slot() {
    let (_dir, mut backend, mut registry) = build(&[&[0]], SurfaceSize::new(32, 32));
    let mut executor = executor();
    let initial = registry.layer(0).unwrap().targets().unwrap().front_slot();

    executor.run_frame(&mut registry, &mut backend).unwrap();
    let after_one = registry.layer(0).unwrap().targets().unwrap().front_slot();
    assert_ne!(after_one, initial);

    executor.run_frame(&mut registry, &mut backend).unwrap();
    assert_eq!(
        registry.layer(0).unwrap().targets().unwrap().front_slot(),
        initial
    );
}

#[test]
fn single_layer_without_feedback_draws_directly() {
    let (_dir, mut backend, mut registry) = build(&[&[]], SurfaceSize::new(700, 400));
    assert!(backend.targets_created.is_empty());

    let plan = executor().run_frame(&mut registry, &mut backend).unwrap();
    assert!(plan.accumulate.is_empty());
    assert_eq!(
        plan.composite,
        vec![CompositeDraw::Procedural {
            layer: 0,
            inputs: Vec::new(),
        }]
    );
    assert_eq!(plan.uniforms.resolution, SurfaceSize::new(700, 400));
    assert_eq!(plan.uniforms.time, 1.5);
}

#[test]
fn cross_layer_reads_see_this_frames_output() {
    let (_dir, mut backend, mut registry) = build(&[&[0], &[0, 1]], SurfaceSize::new(800, 600));
    let initial_front = registry.layer(0).unwrap().targets().unwrap().front_slot();

    let plan = executor().run_frame(&mut registry, &mut backend).unwrap();

    let order: Vec<usize> = plan.accumulate.iter().map(|pass| pass.layer).collect();
    assert_eq!(order, vec![0, 1]);

    let layer0_written = plan.accumulate[0].destination;
    assert_ne!(layer0_written.slot, initial_front);
    assert_eq!(
        plan.accumulate[1].inputs[0],
        ChannelInput {
            unit: 0,
            source: ChannelSource::Target(layer0_written),
        }
    );
    // Layer 1 reads its own previous front, not the back it is writing.
    let ChannelSource::Target(own) = plan.accumulate[1].inputs[1].source else {
        panic!("expected a target read");
    };
    assert_ne!(own, plan.accumulate[1].destination);

    let composite: Vec<usize> = plan.composite.iter().map(CompositeDraw::layer).collect();
    assert_eq!(composite, vec![0, 1]);
    assert_eq!(
        plan.composite[1],
        CompositeDraw::Texture {
            layer: 1,
            source: plan.accumulate[1].destination,
        }
    );
}

#[test]
fn reads_of_layers_without_targets_use_placeholder() {
    let (_dir, mut backend, mut registry) = build(&[&[], &[0, 1]], SurfaceSize::new(16, 16));

    let plan = executor().run_frame(&mut registry, &mut backend).unwrap();
    assert_eq!(plan.accumulate.len(), 1);
    assert_eq!(
        plan.accumulate[0].inputs[0],
        ChannelInput {
            unit: 0,
            source: ChannelSource::Placeholder,
        }
    );
}

#[test]
fn disabled_layers_skip_both_phases() {
    let (_dir, mut backend, mut registry) = build(&[&[0], &[]], SurfaceSize::new(32, 32));
    let front = registry.layer(0).unwrap().targets().unwrap().front_slot();
    assert!(registry.set_enabled(0, false));
    assert!(!registry.set_enabled(7, false));

    let plan = executor().run_frame(&mut registry, &mut backend).unwrap();
    assert!(plan.accumulate.is_empty());
    assert_eq!(
        plan.composite.iter().map(CompositeDraw::layer).collect::<Vec<_>>(),
        vec![1]
    );
    assert_eq!(
        registry.layer(0).unwrap().targets().unwrap().front_slot(),
        front
    );
}

#[test]
fn layer_options_seed_enabled_state() {
    let dir = TempDir::new().unwrap();
    write_layers(dir.path(), &[&[], &[]]);
    let sources = discover_sources(dir.path()).unwrap();
    let options = [
        LayerOptions::default(),
        LayerOptions {
            enabled: false,
            ..LayerOptions::default()
        },
    ];

    let mut backend = MockBackend::default();
    let registry =
        LayerRegistry::build(&mut backend, &sources, &options, SurfaceSize::new(8, 8)).unwrap();
    assert!(registry.layer(0).unwrap().enabled());
    assert!(!registry.layer(1).unwrap().enabled());
}

#[test]
fn pending_resize_applies_before_next_frame() {
    let (_dir, mut backend, mut registry) = build(&[&[0], &[0, 1]], SurfaceSize::new(800, 600));
    let mut executor = executor();
    executor.run_frame(&mut registry, &mut backend).unwrap();

    let fronts: Vec<usize> = registry
        .layers()
        .iter()
        .map(|layer| layer.targets().unwrap().front_slot())
        .collect();
    let programs: Vec<usize> = registry
        .layers()
        .iter()
        .map(|layer| layer.program().id)
        .collect();

    registry.request_resize(SurfaceSize::new(0, 768));
    assert_eq!(registry.pending_resize(), None);
    registry.request_resize(SurfaceSize::new(1024, 768));
    assert_eq!(registry.size(), SurfaceSize::new(800, 600));

    let plan = executor.run_frame(&mut registry, &mut backend).unwrap();
    assert_eq!(registry.size(), SurfaceSize::new(1024, 768));
    assert_eq!(plan.uniforms.resolution, SurfaceSize::new(1024, 768));
    assert_eq!(backend.surface_resizes, vec![SurfaceSize::new(1024, 768)]);
    assert_eq!(backend.compiled, 2);

    for (layer, (front, program)) in registry.layers().iter().zip(fronts.iter().zip(&programs)) {
        assert_eq!(layer.program().id, *program);
        for target in layer.targets().unwrap().iter() {
            assert_eq!(target.size, SurfaceSize::new(1024, 768));
        }
        // The resize keeps the front slot; this frame's accumulate then flips it once.
        assert_ne!(layer.targets().unwrap().front_slot(), *front);
    }
    assert_eq!(
        registry.layer(1).unwrap().channels().iter().collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[test]
fn frame_counter_advances_only_on_success() {
    let (_dir, mut backend, mut registry) = build(&[&[]], SurfaceSize::new(8, 8));
    let mut executor = executor();

    for expected in 0..3 {
        let plan = executor.run_frame(&mut registry, &mut backend).unwrap();
        assert_eq!(plan.uniforms.frame, expected);
    }

    backend.fail_next_submit = Some(FrameError::Timeout);
    assert!(matches!(
        executor.run_frame(&mut registry, &mut backend),
        Err(FrameError::Timeout)
    ));
    assert_eq!(executor.frames_presented(), 3);

    let plan = executor.run_frame(&mut registry, &mut backend).unwrap();
    assert_eq!(plan.uniforms.frame, 3);
}

#[test]
fn standard_uniforms_are_looked_up_by_name() {
    let (_dir, _backend, registry) = build(&[&[]], SurfaceSize::new(8, 8));
    let uniforms = registry.layer(0).unwrap().uniforms();
    assert!(uniforms.resolution.is_some());
    assert!(uniforms.time.is_some());
    assert!(uniforms.frame.is_none());

    let program = &registry.layer(0).unwrap().program().interface;
    assert!(program.declares(RESOLUTION_UNIFORM));
    assert!(program.declares(TIME_UNIFORM));
    assert!(!program.declares(FRAME_UNIFORM));
}

#[test]
fn empty_stack_is_rejected() {
    let dir = TempDir::new().unwrap();
    let sources: Vec<LayerSource> = discover_sources(dir.path()).unwrap();
    assert!(sources.is_empty());

    let mut backend = MockBackend::default();
    let err = LayerRegistry::build(&mut backend, &sources, &[], SurfaceSize::new(8, 8))
        .err()
        .unwrap();
    assert!(matches!(err, RegistryError::Empty { .. }));
    assert!(err.to_string().contains("shader0.frag"));
}

#[test]
fn compile_failures_abort_the_build() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("shader0.frag"), fragment(&[])).unwrap();
    fs::write(dir.path().join("shader1.frag"), "#error broken\n").unwrap();
    let sources = discover_sources(dir.path()).unwrap();

    let mut backend = MockBackend::default();
    let err = LayerRegistry::build(&mut backend, &sources, &[], SurfaceSize::new(8, 8))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        RegistryError::Program(ProgramError::Compile { layer: 1, .. })
    ));
}

#[test]
fn resize_keeps_target_identity() {
    let (_dir, mut backend, mut registry) = build(&[&[0]], SurfaceSize::new(10, 10));
    registry.resize(&mut backend, SurfaceSize::new(20, 30)).unwrap();

    let targets = registry.layer(0).unwrap().targets().unwrap();
    let refs: Vec<TargetRef> = targets
        .iter()
        .map(|target| TargetRef {
            layer: target.layer,
            slot: target.slot,
        })
        .collect();
    assert_eq!(
        refs,
        vec![TargetRef { layer: 0, slot: 0 }, TargetRef { layer: 0, slot: 1 }]
    );
    assert_eq!(backend.targets_created.len(), 2);
}

#[test]
fn incomplete_targets_are_reported_not_fatal() {
    let dir = TempDir::new().unwrap();
    write_layers(dir.path(), &[&[0]]);
    let sources = discover_sources(dir.path()).unwrap();
    let mut backend = MockBackend {
        incomplete_targets: true,
        ..MockBackend::default()
    };

    let mut registry =
        LayerRegistry::build(&mut backend, &sources, &[], SurfaceSize::new(64, 64)).unwrap();
    assert!(registry.layer(0).unwrap().targets().is_some());
    assert_eq!(backend.targets_created, vec![(0, 0), (0, 1)]);

    registry.request_resize(SurfaceSize::new(128, 128));
    let plan = executor().run_frame(&mut registry, &mut backend).unwrap();
    assert_eq!(plan.accumulate.len(), 1);
}

#[test]
fn target_creation_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_layers(dir.path(), &[&[], &[1]]);
    let sources = discover_sources(dir.path()).unwrap();
    let mut backend = MockBackend {
        max_target_dimension: Some(512),
        ..MockBackend::default()
    };

    let result = LayerRegistry::build(&mut backend, &sources, &[], SurfaceSize::new(800, 600));
    let Err(err) = result else {
        panic!("oversized targets must fail the build");
    };
    match err {
        RegistryError::Target(TargetError::TooLarge {
            layer, slot, limit, ..
        }) => {
            assert_eq!((layer, slot, limit), (1, 0, 512));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(backend.targets_created.is_empty());
}

#[test]
fn failed_target_resize_stops_the_frame() {
    let (_dir, mut backend, mut registry) = build(&[&[0]], SurfaceSize::new(256, 256));
    let mut executor = executor();
    backend.max_target_dimension = Some(512);

    registry.request_resize(SurfaceSize::new(1024, 768));
    let result = executor.run_frame(&mut registry, &mut backend);
    assert!(matches!(
        result,
        Err(FrameError::Resize(TargetError::TooLarge { layer: 0, limit: 512, .. }))
    ));
    assert!(backend.submitted.is_empty());
    assert_eq!(executor.frames_presented(), 0);
}
