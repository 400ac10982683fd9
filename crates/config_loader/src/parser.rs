//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。
//!
//! 解析前展开环境变量引用：`${VAR}` 取变量值 (未设置则报错)，
//! `${VAR:-default}` 在变量未设置或为空时取默认值，`$${` 输出字面量 `${`。
//! 展开作用于整个文件内容，注释中的引用同样会被展开。

use contracts::{ContractError, ForwarderSettings};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ForwarderSettings, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ForwarderSettings, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置 (先展开环境变量)
pub fn parse(content: &str, format: ConfigFormat) -> Result<ForwarderSettings, ContractError> {
    let expanded = expand_env(content, |name| std::env::var(name).ok())?;
    match format {
        ConfigFormat::Toml => parse_toml(&expanded),
        ConfigFormat::Json => parse_json(&expanded),
    }
}

/// 展开 `${VAR}` / `${VAR:-default}` 引用
///
/// `lookup` 返回变量值；测试中可注入固定映射。
pub fn expand_env<F>(content: &str, lookup: F) -> Result<String, ContractError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(pos) = rest.find("${") {
        // `$${` 转义
        if rest[..pos].ends_with('$') {
            out.push_str(&rest[..pos - 1]);
            out.push_str("${");
            rest = &rest[pos + 2..];
            continue;
        }

        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];
        let end = after.find('}').ok_or_else(|| {
            ContractError::config_parse(format!(
                "unterminated variable reference '${{{}'",
                after.lines().next().unwrap_or_default()
            ))
        })?;

        let reference = &after[..end];
        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name, Some(default)),
            None => (reference, None),
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ContractError::config_parse(format!(
                "invalid variable name '{name}'"
            )));
        }

        let value = match (lookup(name).filter(|v| !v.is_empty()), default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                return Err(ContractError::config_parse(format!(
                    "environment variable '{name}' is not set"
                )))
            }
        };
        out.push_str(&value);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
