//! 远程存储模块
//!
//! 此模块负责：
//! - 定义身份与上传契约 `RemoteStorage`
//! - 基于reqwest实现Firebase REST接口：匿名登录、流式上传、获取下载地址
//!
//! 框架本身不做自动重试；上传失败交给调用方决定是否重新加载。

// 标准库导入
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// 第三方crate导入
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

// 本地模块导入
use crate::constants::storage_config;
use crate::resolver::ByteStream;

/// 上传进度回调：(已传输字节, 预期总字节)；总字节未知时为0
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// 已登录的身份
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// 用户ID，上传路径按它划分命名空间
    pub uid: String,
    /// 访问令牌
    pub token: Option<String>,
}

/// 上传结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub success: bool,
    pub bytes_transferred: u64,
    pub status_code: Option<u16>,
}

/// 身份与上传契约
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// 当前附加的身份
    fn current_identity(&self) -> Option<Identity>;

    /// 获取匿名身份
    async fn sign_in_anonymously(&self) -> Result<Identity>;

    /// 边读边上传字节流；`expected` 为源给出的长度
    async fn upload_stream(
        &self,
        destination: &str,
        stream: ByteStream,
        expected: Option<u64>,
        on_progress: ProgressCallback,
    ) -> Result<UploadOutcome>;

    /// 已上传对象的持久下载地址
    async fn download_url(&self, destination: &str) -> Result<String>;

    /// 丢弃身份与缓存的令牌
    fn release(&self) {}
}

/// Firebase存储配置
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Web API密钥
    pub api_key: String,
    /// 存储桶名称
    pub bucket: String,
    /// 身份服务地址
    pub identity_endpoint: String,
    /// 存储服务地址
    pub storage_endpoint: String,
    /// 请求超时时间（秒）
    pub timeout: u64,
    /// 上传分块大小（字节）
    pub chunk_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            bucket: String::new(),
            identity_endpoint: storage_config::IDENTITY_ENDPOINT.to_string(),
            storage_endpoint: storage_config::STORAGE_ENDPOINT.to_string(),
            timeout: storage_config::REQUEST_TIMEOUT_SECONDS,
            chunk_size: storage_config::UPLOAD_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    local_id: String,
    id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    #[serde(default)]
    download_tokens: Option<String>,
}

/// 基于Firebase REST接口的远程存储
pub struct FirebaseStorage {
    config: StorageConfig,
    client: Client,
    identity: RwLock<Option<Identity>>,
    /// 上传响应里拿到的下载令牌，避免再查一次元数据
    download_tokens: Mutex<HashMap<String, String>>,
}

impl FirebaseStorage {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .context("创建HTTP客户端失败")?;

        Ok(Self::with_client(config, client))
    }

    /// 使用调用方构建的HTTP客户端
    pub fn with_client(config: StorageConfig, client: Client) -> Self {
        Self {
            config,
            client,
            identity: RwLock::new(None),
            download_tokens: Mutex::new(HashMap::new()),
        }
    }

    /// 附加一个已有身份（例如从上次会话恢复）
    pub fn with_identity(self, identity: Identity) -> Self {
        *self.identity.write() = Some(identity);
        self
    }

    fn ensure_bucket(&self) -> Result<()> {
        if self.config.bucket.is_empty() {
            anyhow::bail!("未配置存储桶，无法使用远程查看器");
        }
        Ok(())
    }

    fn object_url(&self, destination: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.config.storage_endpoint.trim_end_matches('/'),
            self.config.bucket,
            urlencoding::encode(destination)
        )
    }

    fn media_url(&self, destination: &str, token: &str) -> String {
        format!(
            "{}?alt=media&token={}",
            self.object_url(destination),
            urlencoding::encode(token)
        )
    }

    fn auth_header(&self) -> Option<String> {
        self.identity
            .read()
            .as_ref()
            .and_then(|identity| identity.token.as_ref())
            .map(|token| format!("Firebase {}", token))
    }

    fn remember_token(&self, destination: &str, tokens: Option<String>) {
        if let Some(token) = tokens
            .as_deref()
            .and_then(|tokens| tokens.split(',').next())
            .filter(|token| !token.is_empty())
        {
            self.download_tokens
                .lock()
                .insert(destination.to_string(), token.to_string());
        }
    }
}

#[async_trait]
impl RemoteStorage for FirebaseStorage {
    fn current_identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    async fn sign_in_anonymously(&self) -> Result<Identity> {
        if self.config.api_key.is_empty() {
            anyhow::bail!("未配置API密钥，无法匿名登录");
        }

        let url = format!(
            "{}/accounts:signUp?key={}",
            self.config.identity_endpoint.trim_end_matches('/'),
            self.config.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&json!({ "returnSecureToken": true }))
            .send()
            .await
            .context("发送匿名登录请求失败")?;

        if !response.status().is_success() {
            anyhow::bail!("匿名登录返回错误状态: {}", response.status());
        }

        let body: SignUpResponse = response.json().await.context("解析登录响应失败")?;
        let identity = Identity {
            uid: body.local_id,
            token: Some(body.id_token),
        };

        info!("🔑 匿名登录成功: {}", identity.uid);
        *self.identity.write() = Some(identity.clone());

        Ok(identity)
    }

    async fn upload_stream(
        &self,
        destination: &str,
        stream: ByteStream,
        expected: Option<u64>,
        on_progress: ProgressCallback,
    ) -> Result<UploadOutcome> {
        self.ensure_bucket()?;
        debug!("上传 {}: 预期 {:?} 字节", destination, expected);

        let transferred = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&transferred);
        let total = expected.unwrap_or(0);
        let body_stream = ReaderStream::with_capacity(stream, self.config.chunk_size.max(1))
            .inspect(move |chunk| {
                if let Ok(chunk) = chunk {
                    let sent = counter.fetch_add(chunk.len() as u64, Ordering::SeqCst)
                        + chunk.len() as u64;
                    on_progress(sent, total);
                }
            });

        let upload_url = format!(
            "{}/b/{}/o",
            self.config.storage_endpoint.trim_end_matches('/'),
            self.config.bucket
        );
        let mut request = self
            .client
            .post(&upload_url)
            .query(&[("uploadType", "media"), ("name", destination)])
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::wrap_stream(body_stream));
        // 长度未知时按分块传输编码发送
        if let Some(length) = expected {
            request = request.header(CONTENT_LENGTH, length);
        }
        if let Some(auth) = self.auth_header() {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.context("发送上传请求失败")?;
        let status = response.status();
        let bytes_transferred = transferred.load(Ordering::SeqCst);
        if !status.is_success() {
            warn!("❌ 上传被服务端拒绝 [{}]: {}", status, destination);
            return Ok(UploadOutcome {
                success: false,
                bytes_transferred,
                status_code: Some(status.as_u16()),
            });
        }

        match response.json::<ObjectMetadata>().await {
            Ok(metadata) => self.remember_token(destination, metadata.download_tokens),
            Err(e) => debug!("上传响应中没有可用的元数据: {}", e),
        }

        Ok(UploadOutcome {
            success: true,
            bytes_transferred,
            status_code: Some(status.as_u16()),
        })
    }

    fn release(&self) {
        if self.identity.write().take().is_some() {
            debug!("已丢弃远程存储身份");
        }
        self.download_tokens.lock().clear();
    }

    async fn download_url(&self, destination: &str) -> Result<String> {
        self.ensure_bucket()?;

        let cached = self.download_tokens.lock().get(destination).cloned();
        if let Some(token) = cached {
            return Ok(self.media_url(destination, &token));
        }

        let mut request = self.client.get(self.object_url(destination));
        if let Some(auth) = self.auth_header() {
            request = request.header(AUTHORIZATION, auth);
        }

        let response = request.send().await.context("查询对象元数据失败")?;
        if !response.status().is_success() {
            anyhow::bail!("查询对象元数据返回错误状态: {}", response.status());
        }

        let metadata: ObjectMetadata = response.json().await.context("解析对象元数据失败")?;
        self.remember_token(destination, metadata.download_tokens);

        let token = self
            .download_tokens
            .lock()
            .get(destination)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("对象没有下载令牌: {}", destination))?;

        Ok(self.media_url(destination, &token))
    }
}
