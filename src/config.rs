//! 配置管理模块
//!
//! 提供CLI参数解析和加载器配置管理功能

// 标准库导入
use std::path::PathBuf;

// 第三方crate导入
use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

// 本地模块导入
use crate::backend::LimitConfig;
use crate::cache::CacheConfig;
use crate::constants::env_config;
use crate::options::LoadOptions;
use crate::remote_loader::ViewerConfig;
use crate::storage::StorageConfig;
use crate::utils::parse_locator;

/// 加载器配置
///
/// 汇总缓存、查看器、远程存储与翻译上限的配置，支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use document_loader::config::LoaderConfig;
///
/// let config = LoaderConfig::new()
///     .with_cache_dir("/tmp/reader-cache")
///     .with_firebase("api-key", "reader.appspot.com")
///     .with_request_timeout(30);
///
/// assert_eq!(config.storage().bucket, "reader.appspot.com");
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    cache: CacheConfig,
    viewer: ViewerConfig,
    storage: StorageConfig,
    limits: LimitConfig,
}

impl LoaderConfig {
    /// 创建默认配置：系统临时目录下的缓存、默认查看器前缀、未配置的远程存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 从环境变量（以及当前目录的 `.env` 文件）读取配置
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!("已加载环境文件: {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 用给定的查找函数读取配置，缺失的键保持默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::new();

        if let Some(dir) = value(env_config::CACHE_DIR) {
            config = config.with_cache_dir(dir);
        }
        if let Some(api_key) = value(env_config::FIREBASE_API_KEY) {
            config.storage.api_key = api_key;
        }
        if let Some(bucket) = value(env_config::FIREBASE_BUCKET) {
            config.storage.bucket = bucket;
        }
        if let Some(prefix) = value(env_config::VIEWER_URL) {
            config = config.with_viewer_prefix(&prefix);
        }
        if let Some(timeout) = value(env_config::REQUEST_TIMEOUT) {
            let seconds = timeout
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{} 不是有效的秒数: {}", env_config::REQUEST_TIMEOUT, timeout))?;
            config = config.with_request_timeout(seconds);
        }

        Ok(config)
    }

    /// 获取缓存配置
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// 获取查看器配置
    pub fn viewer(&self) -> &ViewerConfig {
        &self.viewer
    }

    /// 获取远程存储配置
    pub fn storage(&self) -> &StorageConfig {
        &self.storage
    }

    /// 获取翻译上限
    pub fn limits(&self) -> &LimitConfig {
        &self.limits
    }

    /// 设置缓存根目录
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache.root_dir = dir.into();
        self
    }

    /// 设置缓存文件名前缀
    pub fn with_cache_prefix(mut self, prefix: &str) -> Self {
        self.cache.file_prefix = prefix.to_string();
        self
    }

    /// 设置上传目标根路径
    pub fn with_upload_root(mut self, root: &str) -> Self {
        self.viewer.upload_root = root.trim_matches('/').to_string();
        self
    }

    /// 设置Firebase凭据
    pub fn with_firebase(mut self, api_key: &str, bucket: &str) -> Self {
        self.storage.api_key = api_key.to_string();
        self.storage.bucket = bucket.to_string();
        self
    }

    /// 设置查看器URL前缀
    pub fn with_viewer_prefix(mut self, prefix: &str) -> Self {
        self.viewer.url_prefix = prefix.to_string();
        self
    }

    /// 设置网络请求超时（秒）
    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.storage.timeout = seconds;
        self
    }

    /// 设置翻译上限
    pub fn with_limits(mut self, limits: LimitConfig) -> Self {
        self.limits = limits;
        self
    }
}

/// CLI参数结构
#[derive(Parser, Debug)]
#[command(author, version, about = "文档加载工具 - 把本地文件或URL加载为可渲染的页面序列", long_about = None)]
pub struct Cli {
    /// 输入文件路径或URL
    #[arg(short, long, value_name = "FILE_OR_URL")]
    pub input: String,

    /// 声明的MIME类型 (可选，缺失时自动探测)
    #[arg(short = 't', long, value_name = "MIME")]
    pub file_type: Option<String>,

    /// 加密文档的密码
    #[arg(short, long)]
    pub password: Option<String>,

    /// 对超大表格启用尺寸与重复行上限
    #[arg(long)]
    pub limit: bool,

    /// 保留可回写原格式的结构
    #[arg(long)]
    pub translatable: bool,

    /// Firebase Web API密钥 (覆盖环境变量)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Firebase存储桶 (覆盖环境变量)
    #[arg(long)]
    pub bucket: Option<String>,

    /// 详细输出模式
    #[arg(short, long)]
    pub verbose: bool,

    /// 静默模式 (仅输出结果)
    #[arg(short, long)]
    pub quiet: bool,

    /// 显示加载统计
    #[arg(long)]
    pub stats: bool,
}

impl Cli {
    /// 把命令行参数合并到基础配置上
    pub fn apply(&self, mut config: LoaderConfig) -> LoaderConfig {
        if let Some(api_key) = &self.api_key {
            config.storage.api_key = api_key.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.storage.bucket = bucket.clone();
        }
        config
    }

    /// 构建本次加载的选项
    pub fn load_options(&self) -> Result<LoadOptions> {
        let locator = parse_locator(&self.input)?;
        let mut options = LoadOptions::new(locator)
            .with_limit(self.limit)
            .with_translatable(self.translatable);

        if let Some(file_type) = &self.file_type {
            options = options.with_file_type(file_type);
        }
        if let Some(password) = &self.password {
            options = options.with_password(password);
        }

        Ok(options)
    }
}
