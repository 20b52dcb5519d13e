//! 远程查看器加载器
//!
//! 接受任何类型的回退加载器：
//! - 可直接网页渲染的类型（HTML、纯文本、PNG、JPEG）原样透传，不产生任何网络请求
//! - 其他类型：获取身份 → 流式上传 → 获取下载地址 → 拼接查看器URL
//!
//! 身份、上传与下载地址之间都有取消检查点；进行中的上传不会被强行中断。

// 标准库导入
use std::sync::Arc;

// 第三方crate导入
use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

// 本地模块导入
use crate::constants::viewer_config;
use crate::detector::{extension_for_mime, Detection, FormatDetector};
use crate::document::Document;
use crate::error::{LoaderError, Result};
use crate::loader::{FileLoader, LoadContext, LoaderKind};
use crate::loader_error;
use crate::options::LoadOptions;
use crate::recent::RecentDocuments;
use crate::resolver::ContentResolver;
use crate::storage::{Identity, ProgressCallback, RemoteStorage};

/// 查看器配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerConfig {
    /// 查看器URL前缀，编码后的下载地址直接拼接在其后
    pub url_prefix: String,
    /// 单页文档标题
    pub page_title: String,
    /// 上传目标根路径
    pub upload_root: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            url_prefix: viewer_config::VIEWER_URL_PREFIX.to_string(),
            page_title: viewer_config::DEFAULT_PAGE_TITLE.to_string(),
            upload_root: viewer_config::UPLOAD_ROOT.to_string(),
        }
    }
}

/// 把下载地址编码后拼接到查看器前缀
pub fn viewer_url(prefix: &str, download_url: &str) -> Result<Url> {
    let composed = format!("{}{}", prefix, urlencoding::encode(download_url));
    Url::parse(&composed)
        .with_context(|| format!("查看器URL无效: {}", composed))
        .map_err(LoaderError::from)
}

/// 远程查看器回退加载器
pub struct RemoteViewerLoader {
    detector: FormatDetector,
    resolver: Arc<dyn ContentResolver>,
    storage: Arc<dyn RemoteStorage>,
    config: ViewerConfig,
    recent: Option<Arc<dyn RecentDocuments>>,
}

impl RemoteViewerLoader {
    pub fn new(resolver: Arc<dyn ContentResolver>, storage: Arc<dyn RemoteStorage>) -> Self {
        Self {
            detector: FormatDetector::new(Arc::clone(&resolver)),
            resolver,
            storage,
            config: ViewerConfig::default(),
            recent: None,
        }
    }

    pub fn with_config(mut self, config: ViewerConfig) -> Self {
        self.config = config;
        self
    }

    /// 探测阶段把文档记入最近列表
    pub fn with_recent(mut self, recent: Arc<dyn RecentDocuments>) -> Self {
        self.recent = Some(recent);
        self
    }

    fn record_recent(&self, detection: &Detection, locator: &Url) {
        let Some(recent) = &self.recent else {
            return;
        };

        let display_name = detection
            .display_name
            .clone()
            .unwrap_or_else(|| locator.to_string());
        if let Err(e) = recent.add_recent(&display_name, locator) {
            warn!("记录最近文档失败: {:#}", e);
        }
    }

    /// 复用已附加的身份，没有时匿名登录
    async fn identity(&self) -> Result<Identity> {
        if let Some(identity) = self.storage.current_identity() {
            debug!("复用已有身份: {}", identity.uid);
            return Ok(identity);
        }

        info!("🔑 没有可用身份，开始匿名登录");
        let identity = self
            .storage
            .sign_in_anonymously()
            .await
            .context("匿名登录失败")?;
        Ok(identity)
    }

    fn destination(&self, identity: &Identity, mime_type: Option<&str>) -> String {
        let extension = mime_type
            .and_then(extension_for_mime)
            .unwrap_or(viewer_config::FALLBACK_EXTENSION);

        format!(
            "{}/{}/{}.{}",
            self.config.upload_root,
            identity.uid,
            Uuid::new_v4(),
            extension
        )
    }
}

#[async_trait]
impl FileLoader for RemoteViewerLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::RemoteViewer
    }

    fn is_supported(&self, _options: &LoadOptions) -> bool {
        true
    }

    async fn load(&self, options: &LoadOptions, context: &LoadContext) -> Result<Document> {
        let locator = options.locator();

        context.checkpoint()?;
        let detection = self.detector.detect(locator, options.file_type()).await;
        self.record_recent(&detection, locator);

        if detection.is_passthrough() {
            info!(
                "📄 类型 {} 可直接渲染，透传原始定位符",
                detection.mime_type.as_deref().unwrap_or_default()
            );
            return Ok(Document::single(&self.config.page_title, locator.clone()));
        }

        context.checkpoint()?;
        let identity = self.identity().await?;

        context.checkpoint()?;
        let stream = self
            .resolver
            .open_stream(locator)
            .await
            .with_context(|| format!("打开待上传内容失败: {}", locator))?;
        let destination = self.destination(&identity, detection.mime_type.as_deref());
        info!("☁️ 上传到: {}", destination);

        let reporter = context.progress().clone();
        let on_progress: ProgressCallback =
            Arc::new(move |transferred: u64, expected: u64| {
                reporter.report_bytes(transferred, expected)
            });

        let outcome = self
            .storage
            .upload_stream(&destination, stream, detection.size, on_progress)
            .await
            .map_err(|e| loader_error!(upload, format!("{:#}", e)))?;
        if !outcome.success {
            return Err(loader_error!(
                upload,
                format!("服务端拒绝上传 {}", destination),
                outcome.status_code
            ));
        }
        debug!("上传完成: {} 字节", outcome.bytes_transferred);

        context.checkpoint()?;
        let download_url = self
            .storage
            .download_url(&destination)
            .await
            .context("获取下载地址失败")?;

        let viewer = viewer_url(&self.config.url_prefix, &download_url)?;
        info!("🔗 查看器地址: {}", viewer);

        Ok(Document::single(&self.config.page_title, viewer))
    }

    fn release(&self) {
        self.storage.release();
        debug!("远程查看器已释放身份与传输句柄");
    }
}
