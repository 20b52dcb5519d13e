//! Document Loader - 文档加载调度与执行框架
//!
//! 这个库提供了加载器生命周期、格式探测、原生文档翻译流水线、
//! 远程查看器上传回退、磁盘缓存和调度等核心功能。

pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod detector;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod loader;
pub mod native_loader;
pub mod options;
pub mod recent;
pub mod remote_loader;
pub mod resolver;
pub mod stats;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use dispatcher::Dispatcher;
pub use document::{Document, Page};
pub use error::{LoaderError, Result};
pub use loader::{FileLoader, FileLoaderListener, LoadHandle, LoadOutcome, LoaderKind, LoaderRunner};
pub use options::LoadOptions;
