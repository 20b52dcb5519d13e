//! 加载请求选项
//!
//! 每次加载请求创建一次 `LoadOptions`，之后只读。

// 第三方crate导入
use url::Url;

/// 单次加载请求的不可变选项
///
/// 支持Builder模式进行链式配置。
///
/// # Examples
///
/// ```rust
/// use document_loader::options::LoadOptions;
/// use url::Url;
///
/// let options = LoadOptions::new(Url::parse("file:///tmp/report.ods").unwrap())
///     .with_file_type("application/vnd.oasis.opendocument.spreadsheet")
///     .with_limit(true);
/// assert!(options.limit());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// 源定位符（本地文件、内容URI或远程地址）
    locator: Url,
    /// 声明的MIME类型，可能为空
    file_type: String,
    /// 加密文档的密码
    password: Option<String>,
    /// 是否对表格尺寸和重复行施加上限
    limit: bool,
    /// 是否保留可回写原格式所需的结构
    translatable: bool,
}

impl LoadOptions {
    /// 创建新的选项实例，默认不声明类型、无密码、不限制、不保留结构
    pub fn new(locator: Url) -> Self {
        Self {
            locator,
            file_type: String::new(),
            password: None,
            limit: false,
            translatable: false,
        }
    }

    pub fn locator(&self) -> &Url {
        &self.locator
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn limit(&self) -> bool {
        self.limit
    }

    pub fn translatable(&self) -> bool {
        self.translatable
    }

    /// 设置声明的文件类型（会去除首尾空白并转换为小写）
    pub fn with_file_type(mut self, file_type: &str) -> Self {
        self.file_type = file_type.trim().to_ascii_lowercase();
        self
    }

    /// 设置密码
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// 设置是否启用尺寸上限
    pub fn with_limit(mut self, limit: bool) -> Self {
        self.limit = limit;
        self
    }

    /// 设置是否保留回写结构
    pub fn with_translatable(mut self, translatable: bool) -> Self {
        self.translatable = translatable;
        self
    }
}
