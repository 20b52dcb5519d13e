/// 文档加载相关常量配置
///
/// 该文件定义了查看器、上传、格式探测与翻译限制相关的常量，方便统一管理和维护

/// 远程查看器配置
pub mod viewer_config {
    /// 查看器URL前缀，下载地址经URL编码后直接拼接在其后
    pub const VIEWER_URL_PREFIX: &str = "https://docs.google.com/viewer?embedded=true&url=";

    /// 单页文档的默认标题
    pub const DEFAULT_PAGE_TITLE: &str = "Document";

    /// 上传目标的根路径
    pub const UPLOAD_ROOT: &str = "uploads";

    /// 无法从MIME类型推导扩展名时使用的扩展名
    pub const FALLBACK_EXTENSION: &str = "bin";

    /// 可以直接在网页中渲染、无需上传的类型
    pub const PASSTHROUGH_TYPES: &[&str] = &["text/html", "text/plain", "image/png", "image/jpeg"];
}

/// 原生文档（OpenDocument）配置
pub mod odf_config {
    /// 原生加载器接受的MIME前缀
    pub const MIME_PREFIXES: &[&str] = &[
        "application/vnd.oasis.opendocument",
        "application/x-vnd.oasis.opendocument",
    ];

    /// 翻译输出文件的基础名
    pub const OUTPUT_BASE_NAME: &str = "temp";

    /// 翻译输出文件的扩展名
    pub const OUTPUT_EXTENSION: &str = ".html";

    /// 输入文档缓存副本的后缀
    pub const INPUT_SUFFIX: &str = "document";
}

/// `limit` 选项启用时的翻译上限
pub mod limit_config {
    /// 表格最大宽度（列）
    pub const MAX_TABLE_WIDTH: u32 = 5000;

    /// 表格最大高度（行）
    pub const MAX_TABLE_HEIGHT: u32 = 1000;

    /// 重复行的最大展开次数
    pub const MAX_ROW_REPETITION: u32 = 100;
}

/// 远程存储配置
pub mod storage_config {
    /// 匿名身份服务地址
    pub const IDENTITY_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

    /// 对象存储服务地址
    pub const STORAGE_ENDPOINT: &str = "https://firebasestorage.googleapis.com/v0";

    /// 上传分块大小（字节），每个分块发送后回报一次进度
    pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

    /// 请求超时时间（秒）
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;
}

/// 格式探测配置
pub mod detector_config {
    /// 内容嗅探读取的最大字节数
    pub const SNIFF_LENGTH: usize = 128;
}

/// 缓存配置
pub mod cache_config {
    /// 缓存根目录名（位于系统临时目录下）
    pub const CACHE_DIR_NAME: &str = "document-loader";

    /// 缓存文件名前缀
    pub const FILE_PREFIX: &str = "doc";
}

/// 环境变量名称
pub mod env_config {
    /// 缓存根目录
    pub const CACHE_DIR: &str = "DOCUMENT_LOADER_CACHE_DIR";

    /// Firebase Web API密钥
    pub const FIREBASE_API_KEY: &str = "DOCUMENT_LOADER_FIREBASE_API_KEY";

    /// Firebase存储桶
    pub const FIREBASE_BUCKET: &str = "DOCUMENT_LOADER_FIREBASE_BUCKET";

    /// 查看器URL前缀
    pub const VIEWER_URL: &str = "DOCUMENT_LOADER_VIEWER_URL";

    /// 网络请求超时（秒）
    pub const REQUEST_TIMEOUT: &str = "DOCUMENT_LOADER_REQUEST_TIMEOUT";
}

/// 判断类型是否可以直接透传给网页渲染
pub fn is_passthrough_type(mime_type: &str) -> bool {
    viewer_config::PASSTHROUGH_TYPES.contains(&mime_type)
}

/// 判断类型是否属于OpenDocument家族
pub fn is_opendocument_type(file_type: &str) -> bool {
    odf_config::MIME_PREFIXES
        .iter()
        .any(|prefix| file_type.starts_with(prefix))
}
