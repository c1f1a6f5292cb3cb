use crate::config::{AsrConfig, AsrMode};
use crate::error::VoiceError;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Server-side transcription through a whisper.cpp-compatible binary.
#[derive(Debug, Clone)]
pub struct SttService {
    model_path: PathBuf,
    binary_path: PathBuf,
    language: Option<String>,
    enabled: bool,
}

/// `zh-CN` → `zh`. Empty or `auto` means let the recognizer detect it.
fn primary_language(tag: &str) -> Option<String> {
    let primary = tag.split(['-', '_']).next().unwrap_or_default().trim();
    if primary.is_empty() || primary.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(primary.to_ascii_lowercase())
    }
}

impl SttService {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            language: None,
            enabled: true,
        }
    }

    /// Builds the service from the `[voice.asr]` section. It is only enabled
    /// when recognition is on and set to run locally.
    pub fn from_config(config: &AsrConfig) -> Self {
        Self {
            model_path: config.local.model_path.clone(),
            binary_path: config.local.binary_path.clone(),
            language: primary_language(&config.language),
            enabled: config.enabled && config.mode == AsrMode::Local,
        }
    }

    pub fn with_language(mut self, tag: &str) -> Self {
        self.language = primary_language(tag);
        self
    }

    /// Enabled and the recognizer model is on disk.
    pub fn is_available(&self) -> bool {
        self.enabled && self.model_path.exists()
    }

    /// Recognizer invocation: model, audio on stdin, plain text out.
    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary_path);
        command.arg("-m").arg(&self.model_path).args(["-f", "-", "-nt"]);
        if let Some(language) = &self.language {
            command.arg("-l").arg(language);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Feeds `audio` to a fresh recognizer process and collects its output.
    async fn run(&self, audio: &[u8]) -> Result<Output, VoiceError> {
        let stt_error = |what: &str, e: std::io::Error| VoiceError::Stt(format!("{what}: {e}"));

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| stt_error("cannot start recognizer", e))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(audio)
                .await
                .map_err(|e| stt_error("recognizer rejected audio", e))?;
        }

        match tokio::time::timeout(STT_TIMEOUT, child.wait_with_output()).await {
            Ok(output) => output.map_err(|e| stt_error("recognizer output unreadable", e)),
            Err(_) => Err(VoiceError::Stt(format!(
                "recognizer gave no result within {}s",
                STT_TIMEOUT.as_secs()
            ))),
        }
    }

    pub async fn transcribe(&self, audio_data: &[u8]) -> Result<String, VoiceError> {
        match audio_data.len() {
            0 => return Err(VoiceError::Stt("audio data is empty".to_string())),
            len if len > MAX_STT_INPUT_BYTES => {
                return Err(VoiceError::Stt(format!(
                    "audio is {len} bytes, over the {MAX_STT_INPUT_BYTES} byte limit"
                )))
            }
            _ => {}
        }

        let output = self.run(audio_data).await?;
        if !output.status.success() {
            return Err(VoiceError::Stt(format!(
                "recognizer exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::info!(bytes = audio_data.len(), chars = text.chars().count(), "audio transcribed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_reduced_to_primary_subtag() {
        assert_eq!(primary_language("zh-CN").as_deref(), Some("zh"));
        assert_eq!(primary_language("en_US").as_deref(), Some("en"));
        assert_eq!(primary_language("auto"), None);
        assert_eq!(primary_language(""), None);
    }

    #[test]
    fn language_flag_only_added_when_known() {
        let args = |service: &SttService| -> Vec<String> {
            service
                .command()
                .as_std()
                .get_args()
                .map(|a| a.to_string_lossy().into_owned())
                .collect()
        };

        let auto = SttService::new("base.bin", "whisper-cli");
        assert_eq!(args(&auto), ["-m", "base.bin", "-f", "-", "-nt"]);

        let zh = auto.with_language("zh-CN");
        assert_eq!(args(&zh)[5..], ["-l", "zh"]);
    }

    #[test]
    fn browser_mode_is_never_available() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut config = AsrConfig::default();
        config.local.model_path = tmp.path().to_path_buf();

        assert!(!SttService::from_config(&config).is_available());

        config.mode = AsrMode::Local;
        assert!(SttService::from_config(&config).is_available());

        config.enabled = false;
        assert!(!SttService::from_config(&config).is_available());
    }
}
