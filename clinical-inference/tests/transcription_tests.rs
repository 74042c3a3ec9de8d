//! Transcription ladder ordering, chunked decoding and audio failures

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clinical_inference::audio::{AudioBuffer, AudioLoader, HoundBackend};
use clinical_inference::fallback::TRANSCRIPTION_UNAVAILABLE;
use clinical_inference::ladder::{AttemptStatus, DirectModelStage, ManualFeatureStage, PipelineStage};
use clinical_inference::runtime::{ComputeDevice, LoadedModelHandle, SpeechBundle};
use clinical_inference::{AudioConfig, InferenceConfig, InferenceError, TimeRange, TranscriptionLadder};
use common::*;

const WORDS: [&str; 2] = ["chest", "pain"];

/// Frames decoding to "chest pain" under greedy CTC
fn chest_pain_frames() -> Vec<u32> {
    vec![PAD, 4, 4, PAD, 5, 5, PAD]
}

fn speech_handle(bundle: SpeechBundle) -> LoadedModelHandle {
    LoadedModelHandle::speech(
        "/models/medasr",
        ComputeDevice::Cpu,
        Arc::new(WordTokenizer::new(&WORDS)),
        bundle,
    )
}

fn standard_ladder() -> TranscriptionLadder {
    TranscriptionLadder::standard(&AudioConfig::default()).unwrap()
}

fn seconds_of_audio(seconds: usize) -> AudioBuffer {
    AudioBuffer::new(vec![0.01; 16_000 * seconds], 16_000)
}

#[test]
fn test_pipeline_success_skips_later_stages() {
    let pipeline = Arc::new(FixedPipeline::new("  Patient reports chest pain.  "));
    let processor = Arc::new(ZeroProcessor::new(128));
    let acoustic = Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6));
    let handle = speech_handle(
        SpeechBundle::default()
            .with_pipeline(pipeline.clone())
            .with_processor(processor.clone())
            .with_acoustic(acoustic.clone()),
    );

    let report = standard_ladder().transcribe(&handle, &seconds_of_audio(3));

    assert_eq!(report.result.text, "Patient reports chest pain.");
    assert_eq!(report.result.segments[0].time_range, TimeRange(0.0, None));
    assert_eq!(report.resolved_by, Some("pipeline"));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(pipeline.calls.load(Ordering::SeqCst), 1);
    assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
    assert_eq!(acoustic.calls(), 0);
}

#[test]
fn test_blank_pipeline_output_falls_through_to_direct_model() {
    let acoustic = Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6));
    let handle = speech_handle(
        SpeechBundle::default()
            .with_pipeline(Arc::new(FixedPipeline::new("   ")))
            .with_processor(Arc::new(ZeroProcessor::new(128)))
            .with_acoustic(acoustic.clone()),
    );

    let report = standard_ladder().transcribe(&handle, &seconds_of_audio(3));

    assert_eq!(report.result.text, "chest pain");
    assert_eq!(report.resolved_by, Some("direct_model"));
    assert_eq!(report.attempts[0].status, AttemptStatus::Empty);
    assert_eq!(acoustic.calls(), 1);
}

#[test]
fn test_pipeline_error_resolved_by_direct_model() {
    let tokenizer = Arc::new(WordTokenizer::new(&["hello", "world"]));
    let acoustic = Arc::new(ScriptedAcoustic::new(vec![PAD, 4, PAD, 5, 5], 6));
    let handle = LoadedModelHandle::speech(
        "/models/medasr",
        ComputeDevice::Cpu,
        tokenizer,
        SpeechBundle::default()
            .with_pipeline(Arc::new(FixedPipeline::new("!fail")))
            .with_processor(Arc::new(ZeroProcessor::new(128)))
            .with_acoustic(acoustic.clone()),
    );

    let report = standard_ladder().transcribe(&handle, &seconds_of_audio(2));

    assert_eq!(
        serde_json::to_value(&report.result).unwrap(),
        serde_json::json!({
            "text": "hello world",
            "segments": [{ "text": "hello world", "time_range": [0.0, null] }]
        })
    );
    // A third stage would have run the acoustic model again
    assert_eq!(acoustic.calls(), 1);
    assert_eq!(report.attempts.len(), 2);
}

#[test]
fn test_manual_features_chunk_long_audio() {
    let acoustic = Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6));
    let handle = speech_handle(
        SpeechBundle::default()
            .with_pipeline(Arc::new(FixedPipeline::new("!fail")))
            .with_acoustic(acoustic.clone()),
    );

    let report = standard_ladder().transcribe(&handle, &seconds_of_audio(50));

    assert_eq!(report.resolved_by, Some("manual_features"));
    assert_eq!(report.attempts[0].status, AttemptStatus::Failed);
    assert_eq!(report.attempts[1].status, AttemptStatus::Unsupported);
    assert_eq!(acoustic.calls(), 3);
    assert_eq!(acoustic.seen_dims.load(Ordering::SeqCst), 128);

    let ranges: Vec<TimeRange> = report.result.segments.iter().map(|s| s.time_range).collect();
    assert_eq!(
        ranges,
        vec![
            TimeRange(0.0, Some(20.0)),
            TimeRange(18.0, Some(38.0)),
            TimeRange(36.0, Some(50.0)),
        ]
    );
    assert_eq!(report.result.text, "chest pain chest pain chest pain");
}

#[test]
fn test_configured_mel_bins_apply_unless_model_states_them() {
    let config = AudioConfig {
        num_mel_bins: 80,
        ..AudioConfig::default()
    };
    let ladder = TranscriptionLadder::new(vec![Box::new(ManualFeatureStage::from_config(&config).unwrap())]);

    let unstated = Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6));
    let handle = speech_handle(SpeechBundle::default().with_acoustic(unstated.clone()));
    assert_eq!(ladder.transcribe(&handle, &seconds_of_audio(2)).result.text, "chest pain");
    assert_eq!(unstated.seen_dims.load(Ordering::SeqCst), 80);

    let stated = Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6).with_feature_dim(64));
    let handle = speech_handle(SpeechBundle::default().with_acoustic(stated.clone()));
    ladder.transcribe(&handle, &seconds_of_audio(2));
    assert_eq!(stated.seen_dims.load(Ordering::SeqCst), 64);
}

#[test]
fn test_parallel_and_sequential_chunking_agree() {
    let config = AudioConfig::default();
    let sequential = TranscriptionLadder::new(vec![Box::new(
        ManualFeatureStage::from_config(&AudioConfig {
            parallel_chunks: false,
            ..config.clone()
        })
        .unwrap(),
    )]);
    let parallel = TranscriptionLadder::new(vec![Box::new(ManualFeatureStage::from_config(&config).unwrap())]);
    let handle = speech_handle(
        SpeechBundle::default().with_acoustic(Arc::new(ScriptedAcoustic::new(chest_pain_frames(), 6))),
    );
    let audio = seconds_of_audio(45);

    assert_eq!(
        sequential.transcribe(&handle, &audio).result,
        parallel.transcribe(&handle, &audio).result
    );
}

#[test]
fn test_all_stages_failing_gives_sentinel() {
    let handle = speech_handle(
        SpeechBundle::default()
            .with_pipeline(Arc::new(FixedPipeline::new("!fail")))
            .with_processor(Arc::new(ZeroProcessor::new(128)))
            .with_acoustic(Arc::new(ScriptedAcoustic::failing())),
    );

    let report = standard_ladder().transcribe(&handle, &seconds_of_audio(5));

    assert_eq!(report.result.text, TRANSCRIPTION_UNAVAILABLE);
    assert!(report.result.is_exhausted());
    assert!(report.result.segments.is_empty());
    assert_eq!(report.resolved_by, None);
    let statuses: Vec<AttemptStatus> = report.attempts.iter().map(|a| a.status).collect();
    // Stage three isolates chunk failures, leaving it with no text
    assert_eq!(
        statuses,
        vec![AttemptStatus::Failed, AttemptStatus::Failed, AttemptStatus::Empty]
    );
}

#[test]
fn test_text_model_supports_no_stage() {
    let tokenizer = Arc::new(WordTokenizer::new(&WORDS));
    let handle = LoadedModelHandle::text(
        "/models/txgemma",
        ComputeDevice::Cpu,
        tokenizer.clone(),
        Arc::new(ScriptedLm::constant(32, tokenizer.vocab_size(), EOS)),
    );

    let report = TranscriptionLadder::new(vec![
        Box::new(PipelineStage::new(30.0)),
        Box::new(DirectModelStage),
    ])
    .transcribe(&handle, &seconds_of_audio(1));

    assert!(report.result.is_exhausted());
    assert!(report.attempts.iter().all(|a| a.status == AttemptStatus::Unsupported));
}

#[test]
fn test_service_transcribes_wav_file() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.wav");
    write_wav(&audio_path, 44_100, 2.0);

    let bundle = SpeechBundle::default().with_pipeline(Arc::new(FixedPipeline::new("No acute distress.")));
    let service = build_service(
        InferenceConfig::default(),
        Arc::new(speech_loader(Arc::new(WordTokenizer::new(&WORDS)), bundle)),
        vec![("medasr", artifact(dir.path(), "medasr"))],
    );

    let result = service.transcribe_audio("medasr", &audio_path).unwrap();
    assert_eq!(result.text, "No acute distress.");
    assert_eq!(
        serde_json::to_value(&result).unwrap(),
        serde_json::json!({
            "text": "No acute distress.",
            "segments": [{ "text": "No acute distress.", "time_range": [0.0, null] }]
        })
    );
}

#[test]
fn test_missing_speech_model_gives_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.wav");
    write_wav(&audio_path, 16_000, 1.0);

    let loader = Arc::new(speech_loader(Arc::new(WordTokenizer::new(&WORDS)), SpeechBundle::default()));
    let service = build_service(
        InferenceConfig::default(),
        loader.clone(),
        vec![("medasr", PathBuf::from("/nonexistent/medasr"))],
    );

    let result = service.transcribe_audio("medasr", &audio_path).unwrap();
    assert!(result.is_exhausted());
    assert_eq!(loader.loads(), 0);
}

#[test]
fn test_undecodable_audio_is_the_only_error() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.m4a");
    std::fs::write(&audio_path, b"definitely not audio").unwrap();

    // No model registered: decoding still fails first
    let service = build_service(
        InferenceConfig::default(),
        Arc::new(speech_loader(Arc::new(WordTokenizer::new(&WORDS)), SpeechBundle::default())),
        Vec::new(),
    )
    .with_audio_loader(AudioLoader::new(
        vec![
            Box::new(FakeBackend::Fail("wav")),
            Box::new(FakeBackend::Fail("symphonia")),
            Box::new(FakeBackend::Fail("ffmpeg")),
        ],
        16_000,
    ));

    match service.transcribe_audio("medasr", &audio_path) {
        Err(InferenceError::AudioDecode { path, attempts }) => {
            assert_eq!(path, audio_path);
            assert_eq!(attempts.len(), 3);
            assert!(attempts[0].starts_with("wav:"));
            assert!(attempts[2].starts_with("ffmpeg:"));
        }
        other => panic!("expected AudioDecode, got {other:?}"),
    }
}

#[test]
fn test_loader_moves_past_empty_backend() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.ogg");
    std::fs::write(&audio_path, b"OggS").unwrap();

    let loader = AudioLoader::new(
        vec![
            Box::new(FakeBackend::Fail("wav")),
            Box::new(FakeBackend::Empty("symphonia")),
            Box::new(FakeBackend::Tone("ffmpeg", 8_000)),
        ],
        16_000,
    );

    let buffer = loader.load(&audio_path).unwrap();
    assert_eq!(buffer.sample_rate, 16_000);
    assert_eq!(buffer.len(), 16_000);
}

#[test]
fn test_hound_only_loader_rejects_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.wav");
    std::fs::write(&audio_path, b"RIFF but not really").unwrap();

    let loader = AudioLoader::new(vec![Box::new(HoundBackend)], 16_000);
    assert!(matches!(
        loader.load(&audio_path),
        Err(InferenceError::AudioDecode { .. })
    ));
}

#[tokio::test]
async fn test_async_transcription() {
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("visit.wav");
    write_wav(&audio_path, 16_000, 1.0);

    let bundle = SpeechBundle::default().with_pipeline(Arc::new(FixedPipeline::new("Lungs clear.")));
    let service = Arc::new(build_service(
        InferenceConfig::default(),
        Arc::new(speech_loader(Arc::new(WordTokenizer::new(&WORDS)), bundle)),
        vec![("medasr", artifact(dir.path(), "medasr"))],
    ));

    let result = service
        .transcribe_audio_async("medasr".into(), audio_path)
        .await
        .unwrap();
    assert_eq!(result.text, "Lungs clear.");
}
