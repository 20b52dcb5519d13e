//! 格式探测模块
//!
//! 按固定的优先级链确定文档的MIME类型，第一个非空结果胜出：
//! 1. 源自身元数据声明的类型（缺失时使用调用方在选项中声明的类型）
//! 2. 根据显示名称的扩展名猜测；显示名称查询失败时退回定位符的最后一个路径段
//! 3. 嗅探字节流开头的若干字节；嗅探后立即关闭流
//!
//! 三步都失败时类型保持未解析，调用方应把它当作"非透传类型"处理而不是直接失败。

// 标准库导入
use std::sync::Arc;

// 第三方crate导入
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use url::Url;

// 本地模块导入
use crate::constants::{detector_config, is_passthrough_type};
use crate::resolver::{ContentResolver, ResolvedMetadata};
use crate::utils::{locator_file_name, normalize_mime_type};

/// 类型来自优先级链的哪一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Declared,
    FileName,
    Content,
}

/// 探测结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    /// 解析出的MIME类型
    pub mime_type: Option<String>,
    /// 显示名称（元数据查询结果或定位符最后一段）
    pub display_name: Option<String>,
    /// 类型的来源
    pub source: Option<DetectionSource>,
    /// 源元数据给出的内容长度
    pub size: Option<u64>,
}

impl Detection {
    /// 是否为可以直接网页渲染的类型
    pub fn is_passthrough(&self) -> bool {
        self.mime_type.as_deref().is_some_and(is_passthrough_type)
    }
}

/// 格式探测器
pub struct FormatDetector {
    resolver: Arc<dyn ContentResolver>,
}

impl FormatDetector {
    pub fn new(resolver: Arc<dyn ContentResolver>) -> Self {
        Self { resolver }
    }

    /// 运行完整的探测链，不会失败
    pub async fn detect(&self, locator: &Url, declared_hint: &str) -> Detection {
        let metadata = match self.resolver.resolve(locator).await {
            Ok(metadata) => metadata,
            Err(e) => {
                // 元数据查询失败不影响后续步骤
                warn!("查询源元数据失败 {}: {:#}", locator, e);
                Default::default()
            }
        };
        let size = metadata.size;

        Detection {
            size,
            ..self.classify(locator, declared_hint, metadata).await
        }
    }

    async fn classify(
        &self,
        locator: &Url,
        declared_hint: &str,
        metadata: ResolvedMetadata,
    ) -> Detection {
        let display_name = metadata
            .display_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| locator_file_name(locator));

        let declared = metadata
            .mime_type
            .as_deref()
            .and_then(normalize_mime_type)
            .or_else(|| normalize_mime_type(declared_hint));
        if let Some(mime_type) = declared {
            return self.finish(mime_type, display_name, DetectionSource::Declared);
        }

        if let Some(mime_type) = display_name.as_deref().and_then(guess_from_name) {
            return self.finish(mime_type, display_name, DetectionSource::FileName);
        }

        if let Some(mime_type) = self.sniff(locator).await {
            return self.finish(mime_type.to_string(), display_name, DetectionSource::Content);
        }

        debug!("无法确定类型: {}", locator);
        Detection {
            mime_type: None,
            display_name,
            source: None,
            size: None,
        }
    }

    fn finish(
        &self,
        mime_type: String,
        display_name: Option<String>,
        source: DetectionSource,
    ) -> Detection {
        debug!("探测到类型 {} (来源: {:?})", mime_type, source);
        Detection {
            mime_type: Some(mime_type),
            display_name,
            source: Some(source),
            size: None,
        }
    }

    /// 打开流读取开头字节；流在本函数返回前被丢弃（关闭）
    async fn sniff(&self, locator: &Url) -> Option<&'static str> {
        let stream = match self.resolver.open_stream(locator).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("打开流用于嗅探失败 {}: {:#}", locator, e);
                return None;
            }
        };

        let mut head = Vec::with_capacity(detector_config::SNIFF_LENGTH);
        let read = stream
            .take(detector_config::SNIFF_LENGTH as u64)
            .read_to_end(&mut head)
            .await;

        match read {
            Ok(_) => sniff_mime_type(&head),
            Err(e) => {
                warn!("读取嗅探字节失败 {}: {}", locator, e);
                None
            }
        }
    }
}

/// 根据文件名扩展名猜测类型
pub fn guess_from_name(name: &str) -> Option<String> {
    mime_guess::from_path(name)
        .first_raw()
        .and_then(normalize_mime_type)
}

/// 根据MIME类型推导文件扩展名
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    // mime_guess 的扩展名列表按字母排序，常见类型优先给出惯用扩展名
    let preferred = match mime_type {
        "application/pdf" => Some("pdf"),
        "image/jpeg" => Some("jpg"),
        "text/plain" => Some("txt"),
        "text/html" => Some("html"),
        "application/msword" => Some("doc"),
        _ => None,
    };

    preferred.or_else(|| {
        mime_guess::get_mime_extensions_str(mime_type).and_then(|extensions| extensions.first().copied())
    })
}

/// 根据内容开头的魔数判断类型
pub fn sniff_mime_type(head: &[u8]) -> Option<&'static str> {
    const ODF_MIMETYPE_OFFSET: usize = 30;

    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("image/png");
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if head.starts_with(b"BM") && head.len() >= 14 {
        return Some("image/bmp");
    }
    if head.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    if head.starts_with(b"PK\x03\x04") {
        // OpenDocument 包把未压缩的 mimetype 条目放在第一个
        let name_end = ODF_MIMETYPE_OFFSET + b"mimetype".len();
        if head.len() > name_end && &head[ODF_MIMETYPE_OFFSET..name_end] == b"mimetype" {
            if let Some(odf) = sniff_odf_mimetype(&head[name_end..]) {
                return Some(odf);
            }
        }
        return Some("application/zip");
    }

    sniff_markup(head)
}

fn sniff_odf_mimetype(content: &[u8]) -> Option<&'static str> {
    const ODF_TYPES: &[&str] = &[
        "application/vnd.oasis.opendocument.text",
        "application/vnd.oasis.opendocument.spreadsheet",
        "application/vnd.oasis.opendocument.presentation",
        "application/vnd.oasis.opendocument.graphics",
    ];

    ODF_TYPES
        .iter()
        .copied()
        .find(|mime| content.starts_with(mime.as_bytes()))
}

fn sniff_markup(head: &[u8]) -> Option<&'static str> {
    let text = head
        .strip_prefix(b"\xEF\xBB\xBF".as_slice())
        .unwrap_or(head);
    let start = text.iter().position(|b| !b.is_ascii_whitespace())?;
    let text = String::from_utf8_lossy(&text[start..]).to_ascii_lowercase();

    if text.starts_with("<?xml") {
        return Some("application/xml");
    }

    const HTML_PREFIXES: &[&str] = &[
        "<!doctype html",
        "<html",
        "<head",
        "<body",
        "<title",
        "<!--",
        "<h1",
        "<br",
        "<p>",
    ];
    if HTML_PREFIXES.iter().any(|prefix| text.starts_with(prefix)) {
        return Some("text/html");
    }

    None
}
