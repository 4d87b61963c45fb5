//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BEE__*` 覆盖（双下划线表示嵌套，如 `BEE__DIALOG__MAX_TURN_STEPS=64`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub dialog: DialogSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// [app] 段：应用名与机器人显示名
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default = "default_bot_label")]
    pub bot_label: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            bot_label: default_bot_label(),
        }
    }
}

fn default_bot_label() -> String {
    "Bee".to_string()
}

/// [dialog] 段：回合循环预算、构建深度、推荐分页与系统话术
#[derive(Debug, Clone, Deserialize)]
pub struct DialogSection {
    /// 单回合内最多执行的 kernel step 次数，超过即视为无进展
    #[serde(default = "default_max_turn_steps")]
    pub max_turn_steps: usize,
    /// 帧的最大嵌套层数（意图帧为第 1 层，列表元素与接口实现按其所在帧计），防止递归 schema 无限展开
    #[serde(default = "default_max_build_depth")]
    pub max_build_depth: usize,
    /// 推荐未指定 page_size 时的默认分页大小
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_fallback_prompt")]
    pub fallback_prompt: String,
    #[serde(default = "default_recover_prompt")]
    pub recover_prompt: String,
    /// 支持 {max}、{attribute} 占位符
    #[serde(default = "default_list_overflow_prompt")]
    pub list_overflow_prompt: String,
    /// 支持 {attribute} 占位符
    #[serde(default = "default_has_more_prompt")]
    pub default_has_more_prompt: String,
}

impl Default for DialogSection {
    fn default() -> Self {
        Self {
            max_turn_steps: default_max_turn_steps(),
            max_build_depth: default_max_build_depth(),
            default_page_size: default_page_size(),
            fallback_prompt: default_fallback_prompt(),
            recover_prompt: default_recover_prompt(),
            list_overflow_prompt: default_list_overflow_prompt(),
            default_has_more_prompt: default_has_more_prompt(),
        }
    }
}

fn default_max_turn_steps() -> usize {
    64
}

fn default_max_build_depth() -> usize {
    8
}

fn default_page_size() -> usize {
    3
}

fn default_fallback_prompt() -> String {
    "Sorry, I did not understand that.".to_string()
}

fn default_recover_prompt() -> String {
    "Sorry, something went wrong. Let us pick up where we were.".to_string()
}

fn default_list_overflow_prompt() -> String {
    "You can only give {max} {attribute}, I will keep the first ones.".to_string()
}

fn default_has_more_prompt() -> String {
    "Do you want to add another {attribute}?".to_string()
}

/// [store] 段：会话持久化
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// SQLite 文件路径，仅在启用 async-sqlite feature 时生效
    pub sqlite_path: Option<PathBuf>,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

/// 从 config 目录加载配置，环境变量 BEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BEE__*（双下划线表示嵌套键）
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
        config::Environment::with_prefix("BEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}
