use soullink_voice::{SttService, VoiceError};

#[tokio::test]
async fn test_stt_missing_binary() {
    let service = SttService::new("model.bin", "/nonexistent/whisper-cli");
    match service.transcribe(b"RIFF").await {
        Err(VoiceError::Stt(msg)) => assert!(msg.starts_with("cannot start recognizer")),
        other => panic!("Expected Stt spawn error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_stt_rejects_empty_audio() {
    let service = SttService::new("model.bin", "whisper-cli");
    assert!(matches!(service.transcribe(&[]).await, Err(VoiceError::Stt(_))));
}

#[tokio::test]
async fn test_stt_rejects_oversized_audio_before_spawning() {
    let service = SttService::new("model.bin", "/nonexistent/whisper-cli");
    let audio = vec![0u8; 10 * 1024 * 1024 + 1];
    match service.transcribe(&audio).await {
        Err(VoiceError::Stt(msg)) => assert!(msg.contains("byte limit")),
        other => panic!("Expected size error, got {:?}", other),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_stt_reads_transcript_from_stdout() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-whisper");
    std::fs::write(
        &script,
        "#!/bin/sh\ncat > /dev/null\nfor arg in \"$@\"; do last=\"$arg\"; done\necho \"  hello from $last  \"\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let service = SttService::new("model.bin", &script).with_language("en-US");
    let text = service.transcribe(b"RIFF....WAVE").await.unwrap();
    assert_eq!(text, "hello from en");
}

#[cfg(unix)]
#[tokio::test]
async fn test_stt_nonzero_exit_is_error() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("failing-whisper");
    std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\necho 'model missing' >&2\nexit 3\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let service = SttService::new("model.bin", &script);
    match service.transcribe(b"RIFF").await {
        Err(VoiceError::Stt(msg)) => {
            assert!(msg.starts_with("recognizer exited with"));
            assert!(msg.contains("model missing"));
        }
        other => panic!("Expected Stt error, got {:?}", other),
    }
}
