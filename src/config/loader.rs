//! 配置加载器实现
//!
//! 读取 TOML 配置文件，替换 `${VAR}` 环境变量后解析并校验

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

/// 环境变量占位符，例如 `${TWILIO_AUTH_TOKEN}`
const ENV_VAR_PATTERN: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";

/// 配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载并校验配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 文件不存在时返回 `ConfigError::FileNotFound`
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载并校验配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;
}

/// TOML配置加载器
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否替换 `${VAR}` 占位符
    substitute_env: bool,
}

impl TomlConfigLoader {
    /// 创建TOML配置加载器
    ///
    /// # 参数
    /// * `substitute_env` - 是否替换 `${VAR}` 占位符
    pub fn new(substitute_env: bool) -> Self {
        Self { substitute_env }
    }

    /// 替换 `${VAR}` 占位符
    ///
    /// 注释行原样保留；所有缺失的变量一次性报告
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.substitute_env {
            return Ok(content.to_string());
        }

        let pattern = Regex::new(ENV_VAR_PATTERN)
            .map_err(|e| ConfigError::ParseError(format!("环境变量占位符规则无效: {e}")))?;

        let mut missing = Vec::new();
        let lines: Vec<String> = content
            .lines()
            .map(|line| {
                if line.trim_start().starts_with('#') {
                    return line.to_string();
                }
                pattern
                    .replace_all(line, |captures: &Captures| {
                        std::env::var(&captures[1]).unwrap_or_else(|_| {
                            missing.push(captures[1].to_string());
                            String::new()
                        })
                    })
                    .into_owned()
            })
            .collect();

        if !missing.is_empty() {
            missing.sort();
            missing.dedup();
            return Err(ConfigError::EnvVarError {
                var: missing.join(", "),
            }
            .into());
        }

        Ok(lines.join("\n"))
    }

    /// 替换、解析并校验
    fn parse(&self, content: &str, source: &str) -> Result<Config> {
        let content = self.substitute_env_vars(content)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{source}: {e}")))?;

        validate_config(&config).map_err(|e| ConfigError::ValidationError(format!("{source}: {e}")))?;
        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();
        let source = path.display().to_string();

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound { path: source }.into());
            }
            Err(e) => {
                return Err(ConfigError::ParseError(format!("读取 {source} 失败: {e}")).into());
            }
        };

        let config = self.parse(&content, &source)?;
        log::info!(
            "已加载配置 {}: 检测间隔 {}s, 轮转间隔 {}s, 并发上限 {}, 通知方式 {}",
            source,
            config.engine.check_interval_seconds,
            config.engine.rotation_interval_seconds,
            config.engine.max_concurrent_probes,
            config.notification.kind
        );
        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        self.parse(content, "<inline>")
    }
}

/// 获取默认配置文件路径
///
/// 当前目录存在 `config.toml` 时使用它，否则使用
/// `<系统配置目录>/uptime-vitals/config.toml`
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from("config.toml");
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|dir| dir.join(crate::APP_NAME).join("config.toml"))
        .unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::NotificationKind;
    use crate::error::UptimeVitalsError;
    use crate::health::scheduler::OverlapPolicy;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const TEST_CONFIG_TOML: &str = r#"
[engine]
check_interval_seconds = 30
max_concurrent_probes = 8
overlap_policy = "queue_one"
data_dir = "/var/lib/uptime"

[notification]
kind = "log"
message_template = "{{id}} is {{state}}"

[logging]
level = "debug"
json_format = true

[logging.module_levels]
reqwest = "warn"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[notification]
kind = "twilio"

[notification.twilio]
account_sid = "${UV_TEST_SID}"
auth_token = "${UV_TEST_TOKEN}"
from_phone = "+15005550006"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.engine.check_interval_seconds, 30);
        assert_eq!(config.engine.rotation_interval_seconds, 86_400);
        assert_eq!(config.engine.max_concurrent_probes, 8);
        assert_eq!(config.engine.overlap_policy, OverlapPolicy::QueueOne);
        assert_eq!(config.engine.data_dir, PathBuf::from("/var/lib/uptime"));
        assert_eq!(
            config.notification.message_template.as_deref(),
            Some("{{id}} is {{state}}")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.logging.module_levels["reqwest"], "warn");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("UV_TEST_SID", "AC999");
        env::set_var("UV_TEST_TOKEN", "token-123");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.notification.kind, NotificationKind::Twilio);
        let twilio = config.notification.twilio.unwrap();
        assert_eq!(twilio.account_sid, "AC999");
        assert_eq!(twilio.auth_token, "token-123");
        assert_eq!(twilio.api_base, "https://api.twilio.com");

        env::remove_var("UV_TEST_SID");
        env::remove_var("UV_TEST_TOKEN");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("UV_TEST_MISSING");
        let loader = TomlConfigLoader::new(true);
        let result = loader
            .load_from_string("[engine]\nuser_agent = \"${UV_TEST_MISSING}\"\n")
            .await;

        match result {
            Err(e) => assert!(e.to_string().contains("UV_TEST_MISSING")),
            Ok(_) => panic!("缺失的环境变量应当报错"),
        }
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let loader = TomlConfigLoader::new(false);
        let result = loader
            .load_from_string("[engine]\ncheck_interval_seconds = 0\n")
            .await;
        assert!(matches!(
            result,
            Err(UptimeVitalsError::Config(ConfigError::ValidationError(_)))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, TEST_CONFIG_TOML).await.unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(&path).await.unwrap();
        assert_eq!(config.engine.max_concurrent_probes, 8);

        let missing = loader.load_from_file(dir.path().join("missing.toml")).await;
        assert!(matches!(
            missing,
            Err(UptimeVitalsError::Config(ConfigError::FileNotFound { .. }))
        ));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[tokio::test]
    #[serial]
    async fn test_placeholders_in_comments_are_ignored() {
        env::remove_var("UV_TEST_UNSET");
        env::set_var("UV_TEST_AGENT", "uptime-bot/2");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(
                "# user_agent = \"${UV_TEST_UNSET}\"\n[engine]\nuser_agent = \"${UV_TEST_AGENT}\"\n",
            )
            .await
            .unwrap();
        assert_eq!(config.engine.user_agent, "uptime-bot/2");

        env::remove_var("UV_TEST_AGENT");
    }

    #[tokio::test]
    #[serial]
    async fn test_all_missing_vars_are_reported() {
        env::remove_var("UV_TEST_A");
        env::remove_var("UV_TEST_B");

        let loader = TomlConfigLoader::new(true);
        let err = loader
            .load_from_string("[engine]\ndata_dir = \"${UV_TEST_A}\"\nlogs_dir = \"${UV_TEST_B}\"\n")
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("UV_TEST_A") && message.contains("UV_TEST_B"));
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.ends_with("config.toml"));
    }
}
