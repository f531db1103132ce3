//! 会话配置
//!
//! 纯数据（POD），可从 TOML 加载；所有字段都有默认值，缺省字段按默认值补齐。
//!
//! ```toml
//! connect_timeout_ms = 10000
//! event_poll_interval_ms = 10
//! event_channel_capacity = 64
//! ```

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 会话配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 连接超时（毫秒）：Connecting 超过此时间未收到 Online 则进入 Error
    pub connect_timeout_ms: u64,
    /// 事件线程轮询间隔（毫秒），也是超时检测的粒度
    pub event_poll_interval_ms: u64,
    /// 外设事件通道容量
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            event_poll_interval_ms: 10,
            event_channel_capacity: 64,
        }
    }
}

impl SessionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn event_poll_interval(&self) -> Duration {
        Duration::from_millis(self.event_poll_interval_ms)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.connect_timeout_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "connect_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.event_poll_interval_ms == 0 {
            return Err(SessionError::InvalidConfig(
                "event_poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(SessionError::InvalidConfig(
                "event_channel_capacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 从 TOML 字符串解析并校验
    pub fn from_toml_str(content: &str) -> Result<Self, SessionError> {
        let config: Self =
            toml::from_str(content).map_err(|e| SessionError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.event_poll_interval(), Duration::from_millis(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = SessionConfig::from_toml_str("connect_timeout_ms = 2500").unwrap();
        assert_eq!(config.connect_timeout_ms, 2500);
        assert_eq!(config.event_channel_capacity, 64);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SessionConfig::from_toml_str("connect_timeout_ms = 0"),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("event_channel_capacity = 0"),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("connect_timeout_ms = \"soon\""),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "event_poll_interval_ms = 5").unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.event_poll_interval_ms, 5);

        assert!(SessionConfig::load("/nonexistent/sphero.toml").is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = SessionConfig {
            connect_timeout_ms: 1234,
            ..Default::default()
        };
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SessionConfig::from_toml_str(&text).unwrap(), config);
    }
}
