//! 内容解析模块
//!
//! 把源定位符解析为声明的MIME类型与显示名称，并打开字节流。
//! 两个操作都可能失败或返回空值，调用方必须容忍。

// 标准库导入
use std::pin::Pin;
use std::time::Duration;

// 第三方crate导入
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::Client;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

// 本地模块导入
use crate::constants::storage_config;
use crate::utils::normalize_mime_type;

/// 打开后的字节流；丢弃即关闭
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// 源自身元数据提供的信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMetadata {
    /// 声明的MIME类型
    pub mime_type: Option<String>,
    /// 显示名称（通常是文件名）
    pub display_name: Option<String>,
    /// 内容长度（字节），未知时为空
    pub size: Option<u64>,
}

/// 内容解析能力
#[async_trait]
pub trait ContentResolver: Send + Sync {
    /// 查询源的元数据
    async fn resolve(&self, locator: &Url) -> Result<ResolvedMetadata>;

    /// 打开源的字节流
    async fn open_stream(&self, locator: &Url) -> Result<ByteStream>;
}

/// 本地文件系统解析器，只处理 `file://` 定位符
///
/// 文件系统不携带声明类型，因此 `mime_type` 始终为空，交给后续探测步骤。
#[derive(Debug, Default, Clone)]
pub struct FsContentResolver;

impl FsContentResolver {
    fn path_of(locator: &Url) -> Result<std::path::PathBuf> {
        if locator.scheme() != "file" {
            anyhow::bail!("不是本地文件定位符: {}", locator);
        }
        locator
            .to_file_path()
            .map_err(|_| anyhow::anyhow!("无法转换为本地路径: {}", locator))
    }
}

#[async_trait]
impl ContentResolver for FsContentResolver {
    async fn resolve(&self, locator: &Url) -> Result<ResolvedMetadata> {
        let path = Self::path_of(locator)?;
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let size = tokio::fs::metadata(&path)
            .await
            .ok()
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len());

        Ok(ResolvedMetadata {
            mime_type: None,
            display_name,
            size,
        })
    }

    async fn open_stream(&self, locator: &Url) -> Result<ByteStream> {
        let path = Self::path_of(locator)?;
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("打开文件失败: {}", path.display()))?;

        Ok(Box::pin(file))
    }
}

/// 远程地址解析器，处理 `http://` 与 `https://` 定位符
#[derive(Debug, Clone)]
pub struct HttpContentResolver {
    client: Client,
}

impl HttpContentResolver {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(storage_config::REQUEST_TIMEOUT_SECONDS))
            .build()
            .context("创建HTTP客户端失败")?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentResolver for HttpContentResolver {
    async fn resolve(&self, locator: &Url) -> Result<ResolvedMetadata> {
        let response = self
            .client
            .head(locator.clone())
            .send()
            .await
            .with_context(|| format!("查询远程元数据失败: {}", locator))?
            .error_for_status()?;

        let headers = response.headers();
        let mime_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(normalize_mime_type);
        let display_name = headers
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition);
        // HEAD响应没有响应体，长度只能从头部读取
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        debug!(
            "远程元数据: type={:?}, name={:?}, size={:?}",
            mime_type, display_name, size
        );

        Ok(ResolvedMetadata {
            mime_type,
            display_name,
            size,
        })
    }

    async fn open_stream(&self, locator: &Url) -> Result<ByteStream> {
        let response = self
            .client
            .get(locator.clone())
            .send()
            .await
            .with_context(|| format!("下载远程内容失败: {}", locator))?
            .error_for_status()?;

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }
}

/// 按定位符的scheme选择本地或远程解析器
#[derive(Debug, Clone)]
pub struct CompositeResolver {
    fs: FsContentResolver,
    http: HttpContentResolver,
}

impl CompositeResolver {
    pub fn new() -> Result<Self> {
        Ok(Self {
            fs: FsContentResolver,
            http: HttpContentResolver::new()?,
        })
    }

    fn select(&self, locator: &Url) -> Result<&dyn ContentResolver> {
        match locator.scheme() {
            "file" => Ok(&self.fs),
            "http" | "https" => Ok(&self.http),
            other => anyhow::bail!("不支持的定位符scheme: {}", other),
        }
    }
}

#[async_trait]
impl ContentResolver for CompositeResolver {
    async fn resolve(&self, locator: &Url) -> Result<ResolvedMetadata> {
        self.select(locator)?.resolve(locator).await
    }

    async fn open_stream(&self, locator: &Url) -> Result<ByteStream> {
        self.select(locator)?.open_stream(locator).await
    }
}

/// 从 `Content-Disposition` 头中提取文件名
fn filename_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}
