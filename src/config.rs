//! 顶层配置文件.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tao_decodebin::DecodeBinConfig;

use crate::logging::LoggingConfig;

/// 顶层配置: 日志与 decodebin 两部分, 均可省略
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaoConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub decodebin: DecodeBinConfig,
}

impl TaoConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: TaoConfig = serde_json::from_str(text).context("解析配置失败")?;
        config
            .decodebin
            .parse_terminal_caps()
            .context("terminal_caps 无效")?;
        Ok(config)
    }
}

/// 读取 JSON 配置文件
pub fn load_config(path: impl AsRef<Path>) -> Result<TaoConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("读取配置文件失败, path={}", path.display()))?;
    TaoConfig::from_json(&text).with_context(|| format!("配置文件无效, path={}", path.display()))
}
