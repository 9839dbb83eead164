//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MASON__*` 覆盖（双下划线表示嵌套，如 `MASON__LLM__PROVIDER=mock`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub pipeline: PipelineSection,
    pub prompts: PromptsSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、端点与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（任意兼容端点）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时回退到 MASON_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 单次模型请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// [pipeline] 段：世界线程派发的等待上限、默认输出 token 预算
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSection {
    /// 状态/进入世界等派发的等待上限
    #[serde(default = "default_setup_dispatch_timeout_secs")]
    pub setup_dispatch_timeout_secs: u64,
    /// 单次工具调用派发的等待上限
    #[serde(default = "default_tool_dispatch_timeout_secs")]
    pub tool_dispatch_timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

fn default_setup_dispatch_timeout_secs() -> u64 {
    10
}

fn default_tool_dispatch_timeout_secs() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    16384
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            setup_dispatch_timeout_secs: default_setup_dispatch_timeout_secs(),
            tool_dispatch_timeout_secs: default_tool_dispatch_timeout_secs(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

/// [prompts] 段：提示词根目录，按 `<root>/<domain>/<name>.txt` 查找
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub root: Option<PathBuf>,
}

impl PromptsSection {
    pub fn root_or_default(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| PathBuf::from("config/prompts"))
    }
}

/// 从 config 目录加载配置，环境变量 MASON__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MASON__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MASON")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 凭据来源：每次运行开始时读取一次
pub trait CredentialProvider: Send + Sync {
    /// 返回非空 API Key；未配置或为空白时返回 None
    fn api_key(&self) -> Option<String>;
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 配置优先，其次环境变量 MASON_API_KEY / OPENAI_API_KEY
#[derive(Debug, Clone)]
pub struct ConfigCredentials {
    configured: Option<String>,
}

impl ConfigCredentials {
    pub fn new(llm: &LlmSection) -> Self {
        Self {
            configured: llm.api_key.clone(),
        }
    }
}

impl CredentialProvider for ConfigCredentials {
    fn api_key(&self) -> Option<String> {
        non_blank(self.configured.clone())
            .or_else(|| non_blank(std::env::var("MASON_API_KEY").ok()))
            .or_else(|| non_blank(std::env::var("OPENAI_API_KEY").ok()))
    }
}

/// 固定凭据（测试与 mock 模式）
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Some(key.into()))
    }

    pub fn missing() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn api_key(&self) -> Option<String> {
        non_blank(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.pipeline.setup_dispatch_timeout_secs, 10);
        assert_eq!(cfg.pipeline.tool_dispatch_timeout_secs, 30);
        assert_eq!(cfg.prompts.root_or_default(), PathBuf::from("config/prompts"));
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nprovider = \"mock\"\nmodel = \"m\"\n\n[pipeline]\ntool_dispatch_timeout_secs = 5"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.model, "m");
        assert_eq!(cfg.pipeline.tool_dispatch_timeout_secs, 5);
        assert_eq!(cfg.pipeline.setup_dispatch_timeout_secs, 10);
    }

    #[test]
    fn test_blank_static_key_is_missing() {
        assert!(StaticCredentials::new("   ").api_key().is_none());
        assert!(StaticCredentials::missing().api_key().is_none());
        assert_eq!(StaticCredentials::new("sk-1").api_key().as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_configured_key_wins() {
        let llm = LlmSection {
            api_key: Some("sk-config".into()),
            ..LlmSection::default()
        };
        assert_eq!(
            ConfigCredentials::new(&llm).api_key().as_deref(),
            Some("sk-config")
        );
    }
}
