//! 配置管理命令
//!
//! CLI 配置文件（TOML）：
//!
//! ```toml
//! name = "sphero"
//!
//! [session]
//! connect_timeout_ms = 10000
//!
//! [simulated]
//! handshake_delay_ms = 300
//! ```

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use sphero_link::SimulatedConfig;
use sphero_session::SessionConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// 默认配置文件路径：`<config_dir>/sphero/config.toml`
pub fn default_config_file() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("无法确定配置目录"))?;
    path.push("sphero");
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// 外设名称（日志与提示符使用）
    pub name: String,
    pub session: SessionConfig,
    pub simulated: SimulatedConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            name: "sphero".to_string(),
            session: SessionConfig::default(),
            simulated: SimulatedConfig::default(),
        }
    }
}

impl CliConfig {
    /// 加载配置
    ///
    /// 显式指定的路径必须存在；默认路径不存在时使用默认配置。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = default_config_file()?;
                if !path.exists() {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            },
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("解析配置文件失败: {}", path.display()))?;
        config.session.validate()?;
        Ok(config)
    }

    /// 保存配置
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("创建配置目录失败")?;
        }
        let content = toml::to_string_pretty(self).context("序列化配置失败")?;
        fs::write(path, format!("# Sphero CLI Configuration\n\n{}", content))
            .context("写入配置文件失败")?;
        Ok(())
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示当前生效的配置
    Show,

    /// 写入默认配置文件
    Init {
        /// 覆盖已存在的文件
        #[arg(short, long)]
        force: bool,
    },

    /// 显示配置文件路径
    Path,
}

impl ConfigCommand {
    pub fn execute(&self, explicit: Option<&Path>) -> Result<()> {
        match self {
            Self::Show => {
                let config = CliConfig::load(explicit)?;
                print!("{}", toml::to_string_pretty(&config)?);
            },
            Self::Init { force } => {
                let path = resolve_path(explicit)?;
                if path.exists() && !force {
                    anyhow::bail!("配置文件已存在: {}（使用 --force 覆盖）", path.display());
                }
                CliConfig::default().save(&path)?;
                println!("✅ 已写入 {}", path.display());
            },
            Self::Path => {
                println!("{}", resolve_path(explicit)?.display());
            },
        }
        Ok(())
    }
}

fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => default_config_file(),
    }
}
