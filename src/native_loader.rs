//! 原生文档加载器
//!
//! 处理OpenDocument系列文档，流程：
//! 打开（输入物化到缓存）→ 解密（可选）→ 选择翻译器 → 翻译 → 输出页面
//!
//! 翻译后端是阻塞接口，整个翻译流水线放在 `spawn_blocking` 中执行。
//! 文档容器与翻译输出在任何退出路径上都会关闭，关闭失败只记录日志。

// 标准库导入
use std::path::Path;
use std::sync::Arc;

// 第三方crate导入
use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

// 本地模块导入
use crate::backend::{
    select_translator, DocumentContainer, LimitConfig, OutputSink, TranslationBackend,
    TranslationSettings,
};
use crate::cache::FileCache;
use crate::constants::{is_opendocument_type, odf_config};
use crate::document::Document;
use crate::error::{LoaderError, Result};
use crate::loader::{FileLoader, LoadContext, LoaderKind};
use crate::loader_error;
use crate::options::LoadOptions;
use crate::resolver::ContentResolver;

/// 翻译过程中逐步累积的结果；只有成功时才转换为 `Document`
#[derive(Debug)]
struct PendingResult {
    options: LoadOptions,
    loader: LoaderKind,
    parts: Vec<(String, Url)>,
}

impl PendingResult {
    fn new(options: LoadOptions, loader: LoaderKind) -> Self {
        Self {
            options,
            loader,
            parts: Vec::new(),
        }
    }

    fn push(&mut self, title: String, uri: Url) {
        self.parts.push((title, uri));
    }

    fn into_document(self) -> Document {
        debug!(
            "[{}] {} 生成 {} 页",
            self.loader,
            self.options.locator(),
            self.parts.len()
        );
        Document::from_parts(self.parts)
    }
}

/// 原生结构化文档加载器
pub struct NativeDocumentLoader {
    backend: Arc<dyn TranslationBackend>,
    resolver: Arc<dyn ContentResolver>,
    cache: Arc<FileCache>,
    limits: LimitConfig,
}

impl NativeDocumentLoader {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        resolver: Arc<dyn ContentResolver>,
        cache: Arc<FileCache>,
    ) -> Self {
        Self {
            backend,
            resolver,
            cache,
            limits: LimitConfig::default(),
        }
    }

    /// 设置 `limit` 选项启用时使用的上限
    pub fn with_limits(mut self, limits: LimitConfig) -> Self {
        self.limits = limits;
        self
    }

    /// 把输入复制到缓存，返回缓存条目名称
    async fn materialize(&self, locator: &Url) -> Result<String> {
        let stream = self
            .resolver
            .open_stream(locator)
            .await
            .with_context(|| format!("打开输入失败: {}", locator))?;

        let name = self
            .cache
            .store_stream(odf_config::INPUT_SUFFIX, stream)
            .await?;
        Ok(name)
    }

    async fn translate(&self, options: &LoadOptions, input: &str, context: &LoadContext) -> Result<Document> {
        let path = self.cache.file_for(input)?;
        let backend = Arc::clone(&self.backend);
        let cache = Arc::clone(&self.cache);
        let limits = self.limits;
        let options = options.clone();
        let cancel = context.cancellation_token().clone();

        let joined = tokio::task::spawn_blocking(move || {
            translate_document(backend.as_ref(), &cache, &limits, &options, &path, &cancel)
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(e) => Err(LoaderError::LoadFailure {
                source: anyhow::Error::new(e).context("翻译任务异常终止"),
            }),
        }
    }
}

#[async_trait]
impl FileLoader for NativeDocumentLoader {
    fn kind(&self) -> LoaderKind {
        LoaderKind::Native
    }

    fn is_supported(&self, options: &LoadOptions) -> bool {
        is_opendocument_type(options.file_type())
    }

    async fn load(&self, options: &LoadOptions, context: &LoadContext) -> Result<Document> {
        context.checkpoint()?;

        let input = self.materialize(options.locator()).await?;
        context.progress().report(10);

        let result = match context.checkpoint() {
            Ok(()) => self.translate(options, &input, context).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.cache.evict(&input) {
            warn!("清理输入副本失败 {}: {:#}", input, e);
        }

        if result.is_ok() {
            context.progress().report(100);
        }
        result
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(LoaderError::Cancelled)
    } else {
        Ok(())
    }
}

/// 打开容器并执行翻译；无论结果如何都关闭容器
fn translate_document(
    backend: &dyn TranslationBackend,
    cache: &Arc<FileCache>,
    limits: &LimitConfig,
    options: &LoadOptions,
    input: &Path,
    cancel: &CancellationToken,
) -> Result<Document> {
    let mut container = backend
        .open(input)
        .with_context(|| format!("打开文档容器失败: {}", input.display()))?;

    let result = run_pipeline(backend, container.as_mut(), cache, limits, options, cancel);

    if let Err(e) = container.close() {
        warn!("关闭文档容器失败: {:#}", e);
    }
    result
}

fn unlock(container: &mut dyn DocumentContainer, options: &LoadOptions) -> Result<()> {
    if !container.is_encrypted()? {
        return Ok(());
    }

    let password = options.password().ok_or_else(|| {
        info!("🔒 文档已加密但未提供密码");
        LoaderError::EncryptedDocument
    })?;

    container.set_password(password);
    if !container.is_password_valid()? {
        info!("🔒 文档密码无效");
        return Err(loader_error!(encrypted));
    }

    debug!("文档密码校验通过");
    Ok(())
}

fn run_pipeline(
    backend: &dyn TranslationBackend,
    container: &mut dyn DocumentContainer,
    cache: &Arc<FileCache>,
    limits: &LimitConfig,
    options: &LoadOptions,
    cancel: &CancellationToken,
) -> Result<Document> {
    unlock(container, options)?;

    let kind = container.document_kind()?;
    let settings = TranslationSettings::for_options(options, Arc::clone(cache), limits);
    let translator_kind = select_translator(&kind, settings.split_pages)?;
    info!("🧭 文档种类: {}，翻译器: {:?}", kind, translator_kind);

    checkpoint(cancel)?;

    let translator = backend.translator(translator_kind)?;
    // 共享缓存中的并发加载各自使用独立的输出名
    let base_name = format!(
        "{}-{}-",
        odf_config::OUTPUT_BASE_NAME,
        Uuid::new_v4().simple()
    );
    let mut output = backend.provide_output(
        &*container,
        &settings,
        &base_name,
        odf_config::OUTPUT_EXTENSION,
    )?;

    let translated = translator.translate(container, output.as_mut(), &settings);
    let closed = output.close();

    let emitted = translated
        .map_err(LoaderError::from)
        .and_then(|()| closed.map_err(LoaderError::from))
        .and_then(|()| checkpoint(cancel))
        .and_then(|()| collect_pages(output.as_ref(), cache, options));

    if emitted.is_err() {
        discard_artifacts(output.as_ref(), cache);
    }
    emitted
}

/// 按翻译器发出顺序把产物解析为缓存文件URI
fn collect_pages(output: &dyn OutputSink, cache: &FileCache, options: &LoadOptions) -> Result<Document> {
    let mut pending = PendingResult::new(options.clone(), LoaderKind::Native);

    for artifact in output.artifacts() {
        let path = cache.file_for(&artifact.name)?;
        let uri = Url::from_file_path(&path)
            .map_err(|_| loader_error!(failure, "无法把缓存路径转换为URI: {}", path.display()))?;
        pending.push(artifact.title, uri);
    }

    Ok(pending.into_document())
}

fn discard_artifacts(output: &dyn OutputSink, cache: &FileCache) {
    for artifact in output.artifacts() {
        if let Err(e) = cache.evict(&artifact.name) {
            warn!("清理未完成的翻译输出失败 {}: {:#}", artifact.name, e);
        }
    }
}
