//! 统一错误处理模块
//!
//! 提供文档加载框架的统一错误类型定义和处理机制。
//! 加载过程中的所有失败都在加载器边界被捕获，并以 `LoaderError` 的形式交给监听器。

// 标准库导入
use std::fmt;

// 第三方crate导入
use anyhow::Error as AnyhowError;

/// 文档加载统一错误类型
///
/// 除 `Upload` 外的所有错误都不可重试；框架本身从不自动重试。
#[derive(Debug)]
pub enum LoaderError {
    /// 在 `initialize` 之前尝试加载
    NotInitialized,

    /// 加密文档缺少密码或密码错误（两种情况对调用方不可区分）
    EncryptedDocument,

    /// 文档类型没有可用的翻译器
    UnsupportedDocument {
        /// 打开后的文档种类
        kind: String,
    },

    /// 调度器找不到能处理该类型的加载器
    NoLoaderAvailable {
        /// 声明的文件类型（可能为空）
        file_type: String,
    },

    /// 上传未成功完成
    Upload {
        /// 错误消息
        message: String,
        /// 服务端状态码（如果适用）
        status_code: Option<u16>,
    },

    /// 加载在检查点被取消；由执行器转换为 `LoadOutcome::Cancelled`，不会交给 `on_error`
    Cancelled,

    /// 其他底层失败（资源打开、翻译器内部错误、身份获取失败等）
    LoadFailure {
        /// 包装的错误
        source: AnyhowError,
    },
}

impl LoaderError {
    /// 调用方是否可以通过再次调用 `load_async` 重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoaderError::Upload { .. })
    }

    /// 是否为取消信号
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoaderError::Cancelled)
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderError::NotInitialized => write!(f, "加载器尚未初始化"),
            LoaderError::EncryptedDocument => write!(f, "文档已加密：缺少密码或密码无效"),
            LoaderError::UnsupportedDocument { kind } => {
                write!(f, "不支持的文档类型: {}", kind)
            }
            LoaderError::NoLoaderAvailable { file_type } => {
                if file_type.is_empty() {
                    write!(f, "没有可用的加载器: 未声明文件类型")
                } else {
                    write!(f, "没有可用的加载器: {}", file_type)
                }
            }
            LoaderError::Upload {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "上传失败 [{}]: {}", code, message)
                } else {
                    write!(f, "上传失败: {}", message)
                }
            }
            LoaderError::Cancelled => write!(f, "加载已取消"),
            LoaderError::LoadFailure { source } => write!(f, "加载失败: {:#}", source),
        }
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoaderError::LoadFailure { source } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// 文档加载结果类型别名
pub type Result<T> = std::result::Result<T, LoaderError>;

/// 便捷的错误创建宏
#[macro_export]
macro_rules! loader_error {
    (encrypted) => {
        $crate::error::LoaderError::EncryptedDocument
    };
    (unsupported, $kind:expr) => {
        $crate::error::LoaderError::UnsupportedDocument {
            kind: $kind.to_string(),
        }
    };
    (no_loader, $file_type:expr) => {
        $crate::error::LoaderError::NoLoaderAvailable {
            file_type: $file_type.to_string(),
        }
    };
    (upload, $msg:expr) => {
        $crate::error::LoaderError::Upload {
            message: $msg.to_string(),
            status_code: None,
        }
    };
    (upload, $msg:expr, $code:expr) => {
        $crate::error::LoaderError::Upload {
            message: $msg.to_string(),
            status_code: $code,
        }
    };
    (failure, $($arg:tt)+) => {
        $crate::error::LoaderError::LoadFailure {
            source: anyhow::anyhow!($($arg)+),
        }
    };
}

/// 从anyhow::Error转换为LoaderError
///
/// 如果anyhow错误内部就是 `LoaderError`，则原样取出，保留错误种类。
impl From<AnyhowError> for LoaderError {
    fn from(error: AnyhowError) -> Self {
        match error.downcast::<LoaderError>() {
            Ok(inner) => inner,
            Err(source) => LoaderError::LoadFailure { source },
        }
    }
}

/// 从std::io::Error转换为LoaderError
impl From<std::io::Error> for LoaderError {
    fn from(error: std::io::Error) -> Self {
        LoaderError::LoadFailure {
            source: error.into(),
        }
    }
}

/// 从reqwest::Error转换为LoaderError
impl From<reqwest::Error> for LoaderError {
    fn from(error: reqwest::Error) -> Self {
        LoaderError::LoadFailure {
            source: error.into(),
        }
    }
}
