use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source platform endpoints
    pub platform: PlatformConfig,

    /// Ordered relay proxy templates, tried first to last
    pub relays: Vec<String>,

    /// Staging host settings
    pub staging: StagingConfig,

    /// Transcription service settings
    pub transcription: TranscriptionConfig,

    /// HTTP tuning shared by all outbound calls
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Pattern a video id must match inside a share link
    pub id_pattern: String,

    /// Video info endpoint; `{id}` is replaced with the video id
    pub metadata_url: String,

    /// Stream listing endpoint; `{id}` and `{cid}` are replaced
    pub stream_url: String,

    /// Captions endpoint; `{aid}` and `{cid}` are replaced
    pub captions_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Ephemeral file-hosting endpoint accepting multipart uploads
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Job submission endpoint
    pub submit_url: String,

    /// Job status endpoint; `{task_id}` is replaced with the job id
    pub poll_url: String,

    /// Model name sent with each job
    pub model: String,

    /// Language hints passed to the service
    pub language_hints: Vec<String>,

    /// Seconds between status polls
    pub poll_interval_secs: u64,

    /// Overall wall-clock budget for one job, in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-attempt timeout for a single relay request, in seconds
    pub attempt_timeout_secs: u64,

    /// Timeout for the staging upload, in seconds; uploads carry whole
    /// audio tracks and need far more room than a relay attempt
    pub upload_timeout_secs: u64,

    /// Smallest payload accepted as real audio rather than an error page
    pub min_audio_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig {
                id_pattern: "BV[0-9A-Za-z]+".to_string(),
                metadata_url: "https://api.bilibili.com/x/web-interface/view?bvid={id}"
                    .to_string(),
                stream_url:
                    "https://api.bilibili.com/x/player/playurl?bvid={id}&cid={cid}&qn=16&fnval=16"
                        .to_string(),
                captions_url: "https://api.bilibili.com/x/player/v2?aid={aid}&cid={cid}"
                    .to_string(),
            },
            relays: vec![
                "https://api.codetabs.com/v1/proxy?quest={target}".to_string(),
                "https://api.allorigins.win/raw?url={target}".to_string(),
                "https://corsproxy.io/?{target}".to_string(),
                "https://proxy.cors.sh/{target}".to_string(),
            ],
            staging: StagingConfig {
                endpoint: "https://file.io".to_string(),
            },
            transcription: TranscriptionConfig {
                submit_url:
                    "https://dashscope.aliyuncs.com/api/v1/services/audio/asr/transcription"
                        .to_string(),
                poll_url: "https://dashscope.aliyuncs.com/api/v1/tasks/{task_id}".to_string(),
                model: "paraformer-v2".to_string(),
                language_hints: vec!["zh".to_string(), "en".to_string()],
                poll_interval_secs: 3,
                timeout_secs: 600,
            },
            http: HttpConfig {
                attempt_timeout_secs: 20,
                upload_timeout_secs: 120,
                min_audio_bytes: 1000,
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("clipscribe").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.relays.is_empty() {
            anyhow::bail!("At least one relay proxy must be configured");
        }

        if self.transcription.poll_interval_secs == 0 {
            anyhow::bail!("Poll interval must be at least one second");
        }

        if self.transcription.timeout_secs < self.transcription.poll_interval_secs {
            anyhow::bail!("Transcription timeout must not be shorter than the poll interval");
        }

        regex::Regex::new(&self.platform.id_pattern)
            .context("Invalid video id pattern")?;

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Metadata endpoint: {}", self.platform.metadata_url);
        println!("  Relays:");
        for relay in &self.relays {
            println!("    - {}", relay);
        }
        println!("  Staging endpoint: {}", self.staging.endpoint);
        println!("  Transcription model: {}", self.transcription.model);
        println!(
            "  Poll every {}s, give up after {}s",
            self.transcription.poll_interval_secs, self.transcription.timeout_secs
        );
    }

    /// Per-attempt timeout for one relay request
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.http.attempt_timeout_secs)
    }

    /// Timeout for the staging upload
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.http.upload_timeout_secs)
    }

    /// Interval between transcription status polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.transcription.poll_interval_secs)
    }

    /// Wall-clock budget for one transcription job
    pub fn transcription_timeout(&self) -> Duration {
        Duration::from_secs(self.transcription.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.relays.len(), 4);
    }

    #[test]
    fn rejects_empty_relay_list() {
        let mut config = Config::default();
        config.relays.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_timeout_shorter_than_interval() {
        let mut config = Config::default();
        config.transcription.timeout_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.transcription.model, config.transcription.model);
        assert_eq!(parsed.relays, config.relays);
    }
}
