//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_FPS: u32 = 30;
pub const MAX_FPS: u32 = 240;

/// Which mouse reporting protocol to request from the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseMode {
    Off,
    /// X10-compatible `ESC [ M` reports; coordinates cap at 223.
    Normal,
    #[default]
    Sgr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fps: u32,
    pub escape_timeout_ms: u64,
    pub mouse: MouseMode,
    pub bracketed_paste: bool,
    pub alternate_screen: bool,
    pub hide_cursor: bool,
    pub synchronized_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            escape_timeout_ms: 50,
            mouse: MouseMode::Sgr,
            bracketed_paste: true,
            alternate_screen: true,
            hide_cursor: true,
            synchronized_output: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FPS).contains(&self.fps) {
            return Err(EngineError::Config(format!(
                "fps must be within 1..={MAX_FPS}, got {}",
                self.fps
            )));
        }
        if self.escape_timeout_ms == 0 {
            return Err(EngineError::Config(
                "escape_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.clamp(1, MAX_FPS)
    }

    pub fn escape_timeout(&self) -> Duration {
        Duration::from_millis(self.escape_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.fps, 30);
        assert_eq!(c.mouse, MouseMode::Sgr);
        assert!(c.bracketed_paste && c.alternate_screen && c.hide_cursor);
        assert_eq!(c.escape_timeout(), Duration::from_millis(50));
        assert_eq!(c.frame_interval(), Duration::from_nanos(33_333_333));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let c = EngineConfig::from_json(r#"{"fps": 60, "mouse": "normal"}"#).unwrap();
        assert_eq!(c.fps, 60);
        assert_eq!(c.mouse, MouseMode::Normal);
        assert!(c.synchronized_output);

        let empty = EngineConfig::from_json("{}").unwrap();
        assert_eq!(empty, EngineConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"fps": 0}"#),
            Err(EngineError::Config(_))
        ));
        assert!(EngineConfig::from_json(r#"{"fps": 241}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"escape_timeout_ms": 0}"#).is_err());
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"mouse": "trackpad"}"#),
            Err(EngineError::Config(_))
        ));
        assert!(EngineConfig::from_json("not json").is_err());
    }
}
