//! 加载器调度
//!
//! 按注册顺序持有一组加载器，选择第一个声明支持请求类型的加载器。
//! 原生加载器应先于接受任何类型的远程查看器加载器注册。

// 标准库导入
use std::sync::Arc;

// 第三方crate导入
use tracing::{debug, info, warn};

// 本地模块导入
use crate::error::Result;
use crate::loader::{
    CompletionExecutor, FileLoaderListener, LoadHandle, LoadOutcome, LoaderKind, LoaderRunner,
};
use crate::loader_error;
use crate::options::LoadOptions;

/// 加载器调度器
#[derive(Default)]
pub struct Dispatcher {
    loaders: Vec<Arc<LoaderRunner>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个加载器；先注册的优先
    pub fn register(&mut self, loader: Arc<LoaderRunner>) -> &mut Self {
        debug!("注册加载器: {}", loader.kind());
        self.loaders.push(loader);
        self
    }

    /// 按注册顺序列出加载器种类
    pub fn kinds(&self) -> Vec<LoaderKind> {
        self.loaders.iter().map(|loader| loader.kind()).collect()
    }

    /// 第一个支持该请求的加载器
    pub fn select(&self, options: &LoadOptions) -> Option<&Arc<LoaderRunner>> {
        self.loaders
            .iter()
            .find(|loader| loader.is_supported(options))
    }

    fn select_or_fail(&self, options: &LoadOptions) -> Result<&Arc<LoaderRunner>> {
        self.select(options).ok_or_else(|| {
            warn!("没有加载器支持类型: {:?}", options.file_type());
            loader_error!(no_loader, options.file_type())
        })
    }

    /// 用同一个监听器与执行器初始化所有加载器
    pub fn initialize_all(
        &self,
        listener: Arc<dyn FileLoaderListener>,
        executor: Arc<dyn CompletionExecutor>,
    ) -> Result<()> {
        for loader in &self.loaders {
            loader.initialize(Arc::clone(&listener), Arc::clone(&executor))?;
        }
        Ok(())
    }

    /// 选择加载器并提交异步加载，返回接手的加载器种类与取消句柄
    pub fn dispatch(&self, options: LoadOptions) -> Result<(LoaderKind, LoadHandle)> {
        let loader = self.select_or_fail(&options)?;
        info!("🚚 {} → {}", options.locator(), loader.kind());

        let handle = loader.load_async(options)?;
        Ok((loader.kind(), handle))
    }

    /// 选择加载器并在当前任务上直接加载
    pub async fn load(&self, options: &LoadOptions) -> LoadOutcome {
        match self.select_or_fail(options) {
            Ok(loader) => loader.load(options).await,
            Err(error) => LoadOutcome::Failure(error),
        }
    }

    pub fn close_all(&self) {
        for loader in &self.loaders {
            loader.close();
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("loaders", &self.kinds())
            .finish()
    }
}
