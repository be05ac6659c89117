//! End-to-end tests for the generation pipeline:
//! request -> cache lookup -> prompt -> model -> WAV -> cache.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use music_core::{
    ComputeBackend, DeviceProfile, GeneratorConfig, MusicError, MusicGenerator, MusicService,
    Precision, RawAudio, Stage, SynthesisBackend, SynthesisError, SynthesisRequest,
};

const SAMPLE_RATE: u32 = 32_000;

/// Scripted model that records every request it receives.
#[derive(Clone, Default)]
struct FakeModel {
    requests: Arc<Mutex<Vec<SynthesisRequest>>>,
    fail: bool,
    reject_half: bool,
}

impl FakeModel {
    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn last_request(&self) -> SynthesisRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl SynthesisBackend for FakeModel {
    fn model_name(&self) -> &str {
        "fake-musicgen"
    }

    fn native_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn enable_half_precision(&mut self) -> Result<(), SynthesisError> {
        if self.reject_half {
            Err(SynthesisError::Rejected("float16 unsupported".to_string()))
        } else {
            Ok(())
        }
    }

    fn synthesize(&self, request: &SynthesisRequest) -> Result<RawAudio, SynthesisError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        if self.fail {
            return Err(SynthesisError::Backend("CUDA out of memory".to_string()));
        }
        // Different output per call, like a sampling model.
        let offset = requests.len() as f32 * 0.01;
        let samples = (0..request.max_new_tokens * 10)
            .map(|i| (i as f32 * 0.05).sin() * 0.5 + offset)
            .chain([f32::NAN, 1.0, -2.0])
            .collect();
        Ok(RawAudio {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

fn generator_in(dir: &std::path::Path, model: FakeModel, cache_enabled: bool) -> MusicGenerator {
    let config = GeneratorConfig {
        cache_dir: dir.join("audio"),
        ..GeneratorConfig::default()
    };
    MusicGenerator::new(config, DeviceProfile::cpu(cache_enabled), model)
}

fn wav_spec(bytes: &[u8]) -> hound::WavSpec {
    hound::WavReader::new(Cursor::new(bytes)).unwrap().spec()
}

#[test]
fn test_first_request_synthesizes_then_cache_serves() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    let key = generator.cache().key_for("đàn tranh", "dân gian Việt Nam", 5.0);
    assert_eq!(generator.cache().get(&key).unwrap(), None);

    let first = generator
        .generate_detailed("đàn tranh", "dân gian Việt Nam", 5.0)
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.cache_key.as_ref(), Some(&key));
    assert_eq!(model.calls(), 1);

    let request = model.last_request();
    assert!(request.prompt.contains("Đàn Tranh"));
    assert!(request.prompt.contains("dân gian Việt Nam"));
    assert_eq!(request.max_new_tokens, 250);
    assert!(request.sampling.do_sample);
    assert_eq!(request.backend, ComputeBackend::Cpu);
    assert_eq!(request.precision, Precision::Full);

    let spec = wav_spec(&first.bytes);
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);

    assert_eq!(generator.cache().get(&key).unwrap(), Some(first.bytes.clone()));

    let second = generator
        .generate_detailed("đàn tranh", "dân gian Việt Nam", 5.0)
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.bytes, first.bytes);
    assert_eq!(model.calls(), 1, "cache hit must not reach the model");
}

#[test]
fn test_spelling_variant_hits_same_entry() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    let accented = generator.generate("Đàn Bầu", "dân gian", 2.0).unwrap();
    let plain = generator.generate("dan bau", "dân gian", 2.0).unwrap();
    assert_eq!(accented, plain);
    assert_eq!(model.calls(), 1);
}

#[test]
fn test_disabled_cache_always_synthesizes() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), false);

    let a = generator.generate_detailed("sáo trúc", "folk", 1.0).unwrap();
    let b = generator.generate_detailed("sáo trúc", "folk", 1.0).unwrap();
    assert!(!a.cache_hit && !b.cache_hit);
    assert!(a.cache_key.is_none());
    assert_ne!(a.bytes, b.bytes, "uncached synthesis is stochastic");
    assert_eq!(model.calls(), 2);
    assert!(!dir.path().join("audio").exists());
}

#[test]
fn test_synthesis_failure_is_reported_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel {
        fail: true,
        ..FakeModel::default()
    };
    let generator = generator_in(dir.path(), model.clone(), true);

    let err = generator.generate("đàn nguyệt", "folk", 3.0).unwrap_err();
    match &err {
        MusicError::Synthesis { instrument, stage, .. } => {
            assert_eq!(instrument, "đàn nguyệt");
            assert_eq!(*stage, Stage::Synthesize);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.stage(), Some(Stage::Synthesize));
    assert_eq!(generator.cache_stats().unwrap().entries, 0);

    // Nothing was cached, so the next call tries the model again.
    let _ = generator.generate("đàn nguyệt", "folk", 3.0);
    assert_eq!(model.calls(), 2);
}

#[test]
fn test_invalid_duration_rejected_before_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            generator.generate("dan tranh", "folk", duration),
            Err(MusicError::InvalidRequest(_))
        ));
    }
    assert_eq!(model.calls(), 0);
}

#[test]
fn test_clear_cache_forces_resynthesis() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    generator.generate("chiêng", "ritual", 1.0).unwrap();
    generator.generate("phách", "ritual", 1.0).unwrap();
    assert_eq!(generator.cache_stats().unwrap().entries, 2);

    generator.clear_cache().unwrap();
    assert_eq!(generator.cache_stats().unwrap().entries, 0);

    let again = generator.generate_detailed("chiêng", "ritual", 1.0).unwrap();
    assert!(!again.cache_hit);
    assert_eq!(model.calls(), 3);
}

#[test]
fn test_half_precision_profile() {
    let dir = tempfile::tempdir().unwrap();
    let gpu = DeviceProfile {
        backend: ComputeBackend::Cuda,
        precision: Precision::Half,
        ..DeviceProfile::cpu(true)
    };
    let config = GeneratorConfig {
        cache_dir: dir.path().join("audio"),
        ..GeneratorConfig::default()
    };

    let model = FakeModel::default();
    let generator = MusicGenerator::new(config.clone(), gpu.clone(), model.clone());
    assert_eq!(generator.device_info().precision, Precision::Half);
    generator.generate("dan co", "folk", 1.0).unwrap();
    assert_eq!(model.last_request().precision, Precision::Half);
    assert_eq!(model.last_request().backend, ComputeBackend::Cuda);

    let stubborn = FakeModel {
        reject_half: true,
        ..FakeModel::default()
    };
    let generator = MusicGenerator::new(config, gpu, stubborn.clone());
    assert_eq!(generator.device_info().precision, Precision::Full);
    assert_eq!(generator.device_info().backend, ComputeBackend::Cuda);
    generator.generate("dan gao", "folk", 1.0).unwrap();
    assert_eq!(stubborn.last_request().precision, Precision::Full);
}

#[test]
fn test_service_wraps_ready_generator() {
    let dir = tempfile::tempdir().unwrap();
    let service = MusicService::ready(generator_in(dir.path(), FakeModel::default(), true));
    assert!(service.is_available());
    assert_eq!(service.device_info().unwrap().backend, ComputeBackend::Cpu);

    let clip = service.generate("trống cơm", "festival", 1.0).unwrap();
    assert!(!clip.cache_hit);
    assert_eq!(service.cache_stats().unwrap().entries, 1);
    service.clear_cache().unwrap();
    assert_eq!(service.cache_stats().unwrap().entries, 0);
}

#[test]
fn test_cache_write_failure_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    // The cache directory path is occupied by a regular file.
    let blocker = dir.path().join("audio");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    let result = generator.generate_detailed("đàn tính", "folk", 1.0);
    assert!(
        matches!(result, Err(MusicError::Storage(_))),
        "expected storage error, got {result:?}"
    );
    assert_eq!(model.calls(), 1, "the clip was synthesized before the write failed");
}

#[test]
fn test_unreadable_entry_counts_as_miss() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    // A directory where the entry file should be: reading it fails with
    // something other than NotFound.
    let key = generator.cache().key_for("sáo tiêu", "folk", 2.0);
    std::fs::create_dir_all(generator.cache().path_for(&key)).unwrap();

    assert_eq!(generator.cached("sáo tiêu", "folk", 2.0).unwrap(), None);
    assert_eq!(model.calls(), 0);

    // The full pipeline falls through to the model. The entry cannot be
    // replaced either, so the write is reported.
    let result = generator.generate_detailed("sáo tiêu", "folk", 2.0);
    assert_eq!(model.calls(), 1);
    assert!(matches!(result, Err(MusicError::Storage(_))));
}

#[test]
fn test_cached_lookup_never_reaches_model() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let generator = generator_in(dir.path(), model.clone(), true);

    assert_eq!(generator.cached("kèn bầu", "folk", 1.0).unwrap(), None);
    assert_eq!(model.calls(), 0);

    let stored = generator.synthesize_and_store("kèn bầu", "folk", 1.0).unwrap();
    assert!(!stored.cache_hit);
    assert_eq!(model.calls(), 1);

    let hit = generator.cached("Kèn Bầu", "folk", 1.0).unwrap().unwrap();
    assert!(hit.cache_hit);
    assert_eq!(hit.bytes, stored.bytes);
    assert_eq!(hit.cache_key, stored.cache_key);
    assert_eq!(model.calls(), 1);

    assert!(matches!(
        generator.cached("kèn bầu", "folk", 0.0),
        Err(MusicError::InvalidRequest(_))
    ));
}

#[test]
fn test_profile_alone_controls_caching() {
    let dir = tempfile::tempdir().unwrap();
    let model = FakeModel::default();
    let config = GeneratorConfig {
        cache_dir: dir.path().join("audio"),
        ..GeneratorConfig::default()
    };
    let generator = MusicGenerator::new(config, DeviceProfile::cpu(false), model.clone());

    let clip = generator.generate_detailed("đàn bầu", "folk", 1.0).unwrap();
    assert!(clip.cache_key.is_none());
    assert!(!generator.cache().is_enabled());
    assert_eq!(generator.cache_stats().unwrap().entries, 0);
    assert_eq!(generator.cached("đàn bầu", "folk", 1.0).unwrap(), None);
}
