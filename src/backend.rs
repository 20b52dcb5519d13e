//! 翻译后端契约
//!
//! 结构化文档的解析与翻译由外部库完成，本模块只定义框架消费的接口：
//! - `DocumentContainer`：打开后的文档容器（加密、密码校验、文档种类）
//! - `Translator`：把文档写入输出的翻译器
//! - `OutputSink`：翻译输出，按发出顺序报告产物名称与标题
//! - `TranslationBackend`：打开容器、提供翻译器与输出
//!
//! 以及框架自己的翻译器选择策略 `select_translator`。
//! 这些接口都是阻塞的，原生加载器在阻塞线程池中调用它们。

// 标准库导入
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

// 第三方crate导入
use anyhow::{Context, Result};

// 本地模块导入
use crate::cache::FileCache;
use crate::constants::limit_config;
use crate::error::LoaderError;
use crate::options::LoadOptions;

/// 打开后的文档种类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Spreadsheet,
    Presentation,
    Graphics,
    /// 后端识别出容器但框架没有对应翻译器的种类
    Unknown(String),
}

impl DocumentKind {
    /// 是否支持一次输出多个产物的批量翻译
    pub fn supports_bulk(&self) -> bool {
        matches!(self, DocumentKind::Spreadsheet | DocumentKind::Presentation)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Text => write!(f, "text"),
            DocumentKind::Spreadsheet => write!(f, "spreadsheet"),
            DocumentKind::Presentation => write!(f, "presentation"),
            DocumentKind::Graphics => write!(f, "graphics"),
            DocumentKind::Unknown(name) => write!(f, "unknown({})", name),
        }
    }
}

/// 翻译器种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslatorKind {
    Text,
    Spreadsheet,
    Presentation,
    Graphics,
    BulkSpreadsheet,
    BulkPresentation,
}

impl TranslatorKind {
    pub fn is_bulk(self) -> bool {
        matches!(
            self,
            TranslatorKind::BulkSpreadsheet | TranslatorKind::BulkPresentation
        )
    }
}

/// 根据文档种类和分页策略选择翻译器
///
/// 只有请求分页且文档支持批量翻译（表格、演示文稿）时选择批量翻译器；
/// 文本和图形文档始终使用单次翻译器。无法识别的种类返回 `UnsupportedDocument`。
pub fn select_translator(
    kind: &DocumentKind,
    split_pages: bool,
) -> std::result::Result<TranslatorKind, LoaderError> {
    let selected = match (kind, split_pages) {
        (DocumentKind::Text, _) => TranslatorKind::Text,
        (DocumentKind::Graphics, _) => TranslatorKind::Graphics,
        (DocumentKind::Spreadsheet, true) => TranslatorKind::BulkSpreadsheet,
        (DocumentKind::Presentation, true) => TranslatorKind::BulkPresentation,
        (DocumentKind::Spreadsheet, false) => TranslatorKind::Spreadsheet,
        (DocumentKind::Presentation, false) => TranslatorKind::Presentation,
        (DocumentKind::Unknown(_), _) => {
            return Err(LoaderError::UnsupportedDocument {
                kind: kind.to_string(),
            })
        }
    };

    Ok(selected)
}

/// 图片存储方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStoreMode {
    /// 图片写入缓存，输出中引用缓存文件
    Cache,
}

/// 表格尺寸上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDimension {
    pub width: u32,
    pub height: u32,
}

/// `limit` 选项启用时施加的上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitConfig {
    pub max_table_dimension: TableDimension,
    pub max_row_repetition: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_table_dimension: TableDimension {
                width: limit_config::MAX_TABLE_WIDTH,
                height: limit_config::MAX_TABLE_HEIGHT,
            },
            max_row_repetition: limit_config::MAX_ROW_REPETITION,
        }
    }
}

/// 传给翻译器的设置
#[derive(Debug, Clone)]
pub struct TranslationSettings {
    /// 输出与图片写入的缓存
    pub cache: Arc<FileCache>,
    /// 是否保留可回写原格式的结构
    pub back_translatable: bool,
    pub image_store_mode: ImageStoreMode,
    /// 是否按页/表拆分输出
    pub split_pages: bool,
    /// 表格尺寸硬上限，仅在 `limit` 时设置
    pub max_table_dimension: Option<TableDimension>,
    /// 重复行展开硬上限，仅在 `limit` 时设置
    pub max_row_repetition: Option<u32>,
}

impl TranslationSettings {
    /// 从加载选项推导设置：启用缓存、缓存存图、默认分页，`limit` 时附加上限
    pub fn for_options(options: &LoadOptions, cache: Arc<FileCache>, limits: &LimitConfig) -> Self {
        let (max_table_dimension, max_row_repetition) = if options.limit() {
            (
                Some(limits.max_table_dimension),
                Some(limits.max_row_repetition),
            )
        } else {
            (None, None)
        };

        Self {
            cache,
            back_translatable: options.translatable(),
            image_store_mode: ImageStoreMode::Cache,
            split_pages: true,
            max_table_dimension,
            max_row_repetition,
        }
    }
}

/// 翻译输出中的一个产物
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// 缓存条目名称
    pub name: String,
    pub title: String,
}

/// 打开后的文档容器
pub trait DocumentContainer: Send {
    /// 容器是否加密
    fn is_encrypted(&self) -> Result<bool>;

    fn set_password(&mut self, password: &str);

    /// 当前密码是否能解密容器
    fn is_password_valid(&self) -> Result<bool>;

    /// 把容器作为文档打开，返回其具体种类
    fn document_kind(&mut self) -> Result<DocumentKind>;

    fn close(&mut self) -> Result<()>;
}

/// 翻译输出
pub trait OutputSink: Send {
    /// 开始一个新产物，之后的写入都进入该产物
    fn begin_artifact(&mut self, title: &str) -> Result<()>;

    /// 当前产物的写入端
    fn writer(&mut self) -> Result<&mut dyn Write>;

    /// 刷新并关闭所有产物
    fn close(&mut self) -> Result<()>;

    /// 已发出的产物，按发出顺序
    fn artifacts(&self) -> Vec<Artifact>;
}

/// 翻译器
pub trait Translator: Send {
    fn translate(
        &self,
        container: &mut dyn DocumentContainer,
        output: &mut dyn OutputSink,
        settings: &TranslationSettings,
    ) -> Result<()>;
}

/// 外部翻译库
pub trait TranslationBackend: Send + Sync {
    /// 打开本地文件为文档容器
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentContainer>>;

    /// 提供指定种类的翻译器
    fn translator(&self, kind: TranslatorKind) -> Result<Box<dyn Translator>>;

    /// 为一次翻译提供输出；默认写入缓存，产物名为 `<基础名><序号><扩展名>`
    fn provide_output(
        &self,
        _container: &dyn DocumentContainer,
        settings: &TranslationSettings,
        base_name: &str,
        extension: &str,
    ) -> Result<Box<dyn OutputSink>> {
        Ok(Box::new(CacheOutput::new(
            Arc::clone(&settings.cache),
            base_name,
            extension,
        )))
    }
}

/// 写入缓存的默认输出实现
pub struct CacheOutput {
    cache: Arc<FileCache>,
    base_name: String,
    extension: String,
    current: Option<File>,
    artifacts: Vec<Artifact>,
}

impl CacheOutput {
    pub fn new(cache: Arc<FileCache>, base_name: &str, extension: &str) -> Self {
        Self {
            cache,
            base_name: base_name.to_string(),
            extension: extension.to_string(),
            current: None,
            artifacts: Vec::new(),
        }
    }

    fn flush_current(&mut self) -> Result<()> {
        if let Some(mut file) = self.current.take() {
            file.flush().context("刷新翻译输出失败")?;
        }
        Ok(())
    }
}

impl OutputSink for CacheOutput {
    fn begin_artifact(&mut self, title: &str) -> Result<()> {
        self.flush_current()?;

        let name = format!("{}{}{}", self.base_name, self.artifacts.len(), self.extension);
        let file = self.cache.open_writer(&name)?;

        self.current = Some(file);
        self.artifacts.push(Artifact {
            name,
            title: title.to_string(),
        });
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut dyn Write> {
        match self.current.as_mut() {
            Some(file) => Ok(file as &mut dyn Write),
            None => anyhow::bail!("尚未开始任何输出产物"),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.flush_current()
    }

    fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use url::Url;

    fn test_cache() -> (tempfile::TempDir, Arc<FileCache>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(CacheConfig {
            root_dir: dir.path().to_path_buf(),
            file_prefix: "t".to_string(),
        })
        .unwrap();
        (dir, Arc::new(cache))
    }

    #[test]
    fn test_bulk_selected_for_split_spreadsheets_and_presentations() {
        assert_eq!(
            select_translator(&DocumentKind::Spreadsheet, true).unwrap(),
            TranslatorKind::BulkSpreadsheet
        );
        assert_eq!(
            select_translator(&DocumentKind::Presentation, true).unwrap(),
            TranslatorKind::BulkPresentation
        );
    }

    #[test]
    fn test_single_shot_when_not_splitting() {
        assert_eq!(
            select_translator(&DocumentKind::Spreadsheet, false).unwrap(),
            TranslatorKind::Spreadsheet
        );
        assert_eq!(
            select_translator(&DocumentKind::Presentation, false).unwrap(),
            TranslatorKind::Presentation
        );
    }

    #[test]
    fn test_text_and_graphics_ignore_split_flag() {
        for split in [true, false] {
            assert_eq!(
                select_translator(&DocumentKind::Text, split).unwrap(),
                TranslatorKind::Text
            );
            assert_eq!(
                select_translator(&DocumentKind::Graphics, split).unwrap(),
                TranslatorKind::Graphics
            );
        }
        assert!(!TranslatorKind::Text.is_bulk());
        assert!(TranslatorKind::BulkSpreadsheet.is_bulk());
    }

    #[test]
    fn test_unknown_kind_is_unsupported() {
        for split in [true, false] {
            let err = select_translator(&DocumentKind::Unknown("chart".into()), split).unwrap_err();
            match err {
                LoaderError::UnsupportedDocument { kind } => assert_eq!(kind, "unknown(chart)"),
                other => panic!("Wrong error type: {:?}", other),
            }
        }
    }

    #[test]
    fn test_settings_without_limit() {
        let (_dir, cache) = test_cache();
        let options = LoadOptions::new(Url::parse("file:///a.ods").unwrap()).with_translatable(true);

        let settings = TranslationSettings::for_options(&options, cache, &LimitConfig::default());
        assert!(settings.back_translatable);
        assert!(settings.split_pages);
        assert_eq!(settings.image_store_mode, ImageStoreMode::Cache);
        assert_eq!(settings.max_table_dimension, None);
        assert_eq!(settings.max_row_repetition, None);
    }

    #[test]
    fn test_settings_with_limit() {
        let (_dir, cache) = test_cache();
        let options = LoadOptions::new(Url::parse("file:///a.ods").unwrap()).with_limit(true);

        let settings = TranslationSettings::for_options(&options, cache, &LimitConfig::default());
        assert!(!settings.back_translatable);
        assert_eq!(
            settings.max_table_dimension,
            Some(TableDimension {
                width: 5000,
                height: 1000
            })
        );
        assert_eq!(settings.max_row_repetition, Some(100));
    }

    #[test]
    fn test_cache_output_emission_order() {
        let (_dir, cache) = test_cache();
        let mut output = CacheOutput::new(Arc::clone(&cache), "temp", ".html");

        assert!(output.writer().is_err());

        output.begin_artifact("Sheet A").unwrap();
        output.writer().unwrap().write_all(b"<table>a</table>").unwrap();
        output.begin_artifact("Sheet B").unwrap();
        output.writer().unwrap().write_all(b"<table>b</table>").unwrap();
        output.close().unwrap();

        let artifacts = output.artifacts();
        assert_eq!(
            artifacts,
            vec![
                Artifact {
                    name: "temp0.html".to_string(),
                    title: "Sheet A".to_string()
                },
                Artifact {
                    name: "temp1.html".to_string(),
                    title: "Sheet B".to_string()
                },
            ]
        );
        assert_eq!(cache.read("temp1.html").unwrap(), b"<table>b</table>");
    }
}
