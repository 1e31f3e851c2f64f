use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{FlowError, Result};

const CONFIG_PATHS: [&str; 2] = ["./tsflow.toml", "./tsflow_config.toml"];

/// How the TS packetizer keeps itself aligned on packet boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Trust the byte alignment of the input, never look for sync bytes.
    Modulo,
    /// Hunt for the sync byte once, then trust alignment.
    #[default]
    Once,
    /// Verify alignment on every call and skip bytes until sync is regained.
    Continuous,
}

impl FromStr for SyncMode {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "modulo" => Ok(SyncMode::Modulo),
            "once" => Ok(SyncMode::Once),
            "continuous" => Ok(SyncMode::Continuous),
            other => Err(FlowError::Config(format!("unknown sync mode '{}'", other))),
        }
    }
}

/// Timing field a TS pacer follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimingSource {
    #[default]
    Pcr,
    /// DTS when present, PTS otherwise.
    Pts,
}

impl FromStr for TimingSource {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pcr" => Ok(TimingSource::Pcr),
            "pts" | "dts" => Ok(TimingSource::Pts),
            other => Err(FlowError::Config(format!("unknown timing source '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TSPacketizerConfig {
    /// TS packets grouped into one output unit.
    pub packets_per_frame: usize,
    pub sync: SyncMode,
    /// Withhold a short final group until it is complete.
    pub exact: bool,
}

impl Default for TSPacketizerConfig {
    fn default() -> Self {
        Self {
            packets_per_frame: 7,
            sync: SyncMode::Once,
            exact: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RTPPacketizerConfig {
    /// TS packets carried after every RTP header.
    pub packets_per_frame: usize,
}

impl Default for RTPPacketizerConfig {
    fn default() -> Self {
        Self {
            packets_per_frame: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TLVConfig {
    /// Largest accepted payload length.
    pub max_length: usize,
    /// Accepted frame types; `None` accepts all.
    pub allowed_types: Option<Vec<u8>>,
    /// Frame type whose stripped null packets are restored.
    pub null_padding_type: Option<u8>,
    /// Full size, in TS packets, of a reinflated payload.
    pub packets_per_frame: usize,
}

impl Default for TLVConfig {
    fn default() -> Self {
        Self {
            max_length: 4096,
            allowed_types: None,
            null_padding_type: None,
            packets_per_frame: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Errors collected per `track` call before validation stops.
    pub max_errors: usize,
    /// Minimum spacing of periodic statistics log lines.
    pub log_interval: Duration,
    /// Clock rate of RTP timestamps.
    pub clock_rate: u64,
    pub max_sequence_gap: u64,
    pub max_timestamp_gap: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_errors: 20,
            log_interval: Duration::from_secs(10),
            clock_rate: 90_000,
            max_sequence_gap: 1,
            max_timestamp_gap: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacerConfig {
    pub timing: TimingSource,
    /// Also re-anchor when running ahead of schedule by more than `tolerance`.
    pub adjust_reference: bool,
    /// Lateness tolerated before the time reference is re-anchored.
    pub tolerance: Duration,
    pub max_sequence_gap: u64,
    /// Largest media time step not treated as a discontinuity.
    pub max_timestamp_gap: Duration,
    /// Clock rate of RTP timestamps.
    pub clock_rate: u64,
    /// Bounded queue depth of the asynchronous pacer.
    pub queue_depth: usize,
    /// Size of each pooled frame buffer of the asynchronous pacer.
    pub buffer_size: usize,
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            timing: TimingSource::Pcr,
            adjust_reference: false,
            tolerance: Duration::from_secs(1),
            max_sequence_gap: 1,
            max_timestamp_gap: Duration::from_secs(1),
            clock_rate: 90_000,
            queue_depth: 64,
            buffer_size: 2048,
        }
    }
}

/// Complete configuration, built once at start-up and handed to each
/// component by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub ts: TSPacketizerConfig,
    pub rtp: RTPPacketizerConfig,
    pub tlv: TLVConfig,
    pub tracker: TrackerConfig,
    pub pacer: PacerConfig,
}

impl Config {
    /// Defaults, overridden by the first readable config file, overridden
    /// by `TSFLOW_*` environment variables.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        for path in &CONFIG_PATHS {
            if let Ok(content) = fs::read_to_string(path) {
                config.apply_lines(&content)?;
                break;
            }
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Parses `key = value` lines on top of the defaults.
    pub fn from_str_lines(content: &str) -> Result<Self> {
        let mut config = Config::default();
        config.apply_lines(content)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_str_lines(&fs::read_to_string(path)?)
    }

    fn apply_lines(&mut self, content: &str) -> Result<()> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('[') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| FlowError::Config(format!("expected key = value, got '{}'", line)))?;
            let value = value.split('#').next().unwrap_or_default();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            self.set(key.trim(), value)?;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        for (var, value) in env::vars() {
            if let Some(rest) = var.strip_prefix("TSFLOW_") {
                let key = rest.to_ascii_lowercase().replacen('_', ".", 1);
                self.set(&key, &value)?;
            }
        }
        Ok(())
    }

    /// Sets one dotted key such as `ts.packets_per_frame`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "ts.packets_per_frame" => self.ts.packets_per_frame = value.parse()?,
            "ts.sync" => self.ts.sync = value.parse()?,
            "ts.exact" => self.ts.exact = parse_bool(value)?,
            "rtp.packets_per_frame" => self.rtp.packets_per_frame = value.parse()?,
            "tlv.max_length" => self.tlv.max_length = value.parse()?,
            "tlv.allowed_types" => {
                let types = value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::parse)
                    .collect::<std::result::Result<Vec<u8>, _>>()?;
                self.tlv.allowed_types = Some(types);
            }
            "tlv.null_padding_type" => self.tlv.null_padding_type = Some(value.parse()?),
            "tlv.packets_per_frame" => self.tlv.packets_per_frame = value.parse()?,
            "tracker.max_errors" => self.tracker.max_errors = value.parse()?,
            "tracker.log_interval_ms" => {
                self.tracker.log_interval = Duration::from_millis(value.parse()?)
            }
            "tracker.clock_rate" => self.tracker.clock_rate = value.parse()?,
            "pacer.timing" => self.pacer.timing = value.parse()?,
            "pacer.adjust_reference" => self.pacer.adjust_reference = parse_bool(value)?,
            "pacer.tolerance_ms" => self.pacer.tolerance = Duration::from_millis(value.parse()?),
            "pacer.max_sequence_gap" => {
                self.pacer.max_sequence_gap = value.parse()?;
                self.tracker.max_sequence_gap = self.pacer.max_sequence_gap;
            }
            "pacer.max_timestamp_gap_ms" => {
                self.pacer.max_timestamp_gap = Duration::from_millis(value.parse()?);
                self.tracker.max_timestamp_gap = self.pacer.max_timestamp_gap;
            }
            "pacer.clock_rate" => self.pacer.clock_rate = value.parse()?,
            "pacer.queue_depth" => self.pacer.queue_depth = value.parse()?,
            "pacer.buffer_size" => self.pacer.buffer_size = value.parse()?,
            other => return Err(FlowError::Config(format!("unknown key '{}'", other))),
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(FlowError::Config(format!("expected a boolean, got '{}'", other))),
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        let template = r#"# tsflow configuration
# Every key is optional; TSFLOW_<SECTION>_<KEY> environment variables override it.

ts.packets_per_frame = 7
ts.sync = "once"          # modulo | once | continuous
ts.exact = false

rtp.packets_per_frame = 7

tlv.max_length = 4096
# tlv.allowed_types = "1,2"
# tlv.null_padding_type = 1

tracker.max_errors = 20
tracker.log_interval_ms = 10000

pacer.timing = "pcr"      # pcr | pts
pacer.adjust_reference = false
pacer.tolerance_ms = 1000
pacer.max_sequence_gap = 1
pacer.max_timestamp_gap_ms = 1000
pacer.queue_depth = 64
"#;
        fs::write(path, template)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_lines() {
        let config = Config::from_str_lines(
            r#"
            # comment
            ts.packets_per_frame = 4
            ts.sync = "continuous"
            ts.exact = true
            tlv.allowed_types = "1, 2,3"
            pacer.timing = 'pts'
            pacer.tolerance_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.ts.packets_per_frame, 4);
        assert_eq!(config.ts.sync, SyncMode::Continuous);
        assert!(config.ts.exact);
        assert_eq!(config.tlv.allowed_types, Some(vec![1, 2, 3]));
        assert_eq!(config.pacer.timing, TimingSource::Pts);
        assert_eq!(config.pacer.tolerance, Duration::from_millis(250));
        assert_eq!(config.rtp, RTPPacketizerConfig::default());
    }

    #[test]
    fn test_rejects_unknown_key_and_bad_values() {
        assert!(matches!(
            Config::from_str_lines("ts.nope = 1"),
            Err(FlowError::Config(_))
        ));
        assert!(matches!(
            Config::from_str_lines("ts.packets_per_frame = seven"),
            Err(FlowError::ParseInt(_))
        ));
        assert!(Config::from_str_lines("ts.sync = sometimes").is_err());
    }

    #[test]
    fn test_template_round_trips() {
        let dir = std::env::temp_dir().join(format!("tsflow-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tsflow.toml");
        let _ = fs::remove_file(&path);

        create_default_config_template(&path).unwrap();
        assert_eq!(Config::from_file(&path).unwrap(), Config::default());
        fs::remove_file(&path).unwrap();
    }
}
