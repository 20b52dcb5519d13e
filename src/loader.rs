//! 加载器契约与执行框架
//!
//! 此模块负责：
//! - 定义所有后端都要满足的 `FileLoader` 契约
//! - 用 `LoaderRunner` 统一生命周期：初始化、排队加载、进度、取消与关闭
//! - 把结果与进度投递到调用方指定的完成上下文，而不是在后台线程内联回调
//!
//! # 并发模型
//!
//! 每个 `LoaderRunner` 拥有一个私有的串行工作者（一个tokio任务消费FIFO队列），
//! `load_async` 只是入队并立即返回。同一实例上的加载严格按提交顺序逐个执行；
//! 不同实例的工作者相互独立，可以并发。状态字段是原子值，任何线程都可以读取。
//!
//! 每次加载恰好产生一个终态回调：`on_success`、`on_error` 或 `on_cancelled`。

// 标准库导入
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

// 第三方crate导入
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// 本地模块导入
use crate::document::Document;
use crate::error::{LoaderError, Result};
use crate::loader_error;
use crate::options::LoadOptions;

/// 加载器身份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoaderKind {
    /// 原生结构化文档加载器
    Native,
    /// 远程查看器回退加载器
    RemoteViewer,
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoaderKind::Native => write!(f, "native"),
            LoaderKind::RemoteViewer => write!(f, "remote-viewer"),
        }
    }
}

/// 加载后端契约
///
/// 实现只负责"如何把一个请求变成 `Document`"；排队、状态、回调投递由 `LoaderRunner` 完成。
#[async_trait]
pub trait FileLoader: Send + Sync {
    fn kind(&self) -> LoaderKind;

    /// 只看 `options.file_type()` 的纯谓词，不得做I/O或分配资源
    fn is_supported(&self, options: &LoadOptions) -> bool;

    /// 执行一次加载。在检查点发现取消时返回 `LoaderError::Cancelled`。
    async fn load(&self, options: &LoadOptions, context: &LoadContext) -> Result<Document>;

    /// 关闭后、队列排空时调用一次，用于丢弃身份、连接等环境句柄
    fn release(&self) {}
}

/// 加载结果的接收方
pub trait FileLoaderListener: Send + Sync {
    fn on_success(&self, document: Document);

    fn on_error(&self, error: LoaderError);

    fn on_cancelled(&self) {
        debug!("加载已取消");
    }

    fn on_progress(&self, _progress: u8) {}
}

/// 一次加载的终态
#[derive(Debug)]
pub enum LoadOutcome {
    Success(Document),
    Failure(LoaderError),
    Cancelled,
}

impl LoadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadOutcome::Success(_))
    }

    pub fn document(&self) -> Option<&Document> {
        match self {
            LoadOutcome::Success(document) => Some(document),
            _ => None,
        }
    }

    /// 转换为 `Result`，取消映射为 `LoaderError::Cancelled`
    pub fn into_result(self) -> Result<Document> {
        match self {
            LoadOutcome::Success(document) => Ok(document),
            LoadOutcome::Failure(error) => Err(error),
            LoadOutcome::Cancelled => Err(LoaderError::Cancelled),
        }
    }

    fn deliver(self, listener: &dyn FileLoaderListener) {
        match self {
            LoadOutcome::Success(document) => listener.on_success(document),
            LoadOutcome::Failure(error) => listener.on_error(error),
            LoadOutcome::Cancelled => listener.on_cancelled(),
        }
    }
}

/// 投递到完成上下文的任务
pub type Task = Box<dyn FnOnce() + Send>;

/// 完成上下文：回调与进度在这里执行
pub trait CompletionExecutor: Send + Sync {
    fn execute(&self, task: Task);
}

/// 直接在工作者上执行回调；适合回调本身就是线程安全通道的场景
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl CompletionExecutor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// 调用方拥有的"主"执行上下文
///
/// 任务按投递顺序排队，只有调用方运行 `run_pending` / `run_next` 时才执行，
/// 因此回调总是在调用方自己的线程上发生。
pub struct MainContext {
    sender: mpsc::UnboundedSender<Task>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>,
}

impl MainContext {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// 向该上下文投递任务的执行器
    pub fn executor(&self) -> Arc<dyn CompletionExecutor> {
        Arc::new(MainExecutor {
            sender: self.sender.clone(),
        })
    }

    /// 执行所有已排队的任务，返回执行数量
    pub fn run_pending(&self) -> usize {
        let Ok(mut receiver) = self.receiver.try_lock() else {
            return 0;
        };

        let mut executed = 0;
        while let Ok(task) = receiver.try_recv() {
            task();
            executed += 1;
        }
        executed
    }

    /// 等待并执行下一个任务
    pub async fn run_next(&self) -> bool {
        let task = self.receiver.lock().await.recv().await;
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl Default for MainContext {
    fn default() -> Self {
        Self::new()
    }
}

struct MainExecutor {
    sender: mpsc::UnboundedSender<Task>,
}

impl CompletionExecutor for MainExecutor {
    fn execute(&self, task: Task) {
        if self.sender.send(task).is_err() {
            warn!("主执行上下文已销毁，丢弃回调");
        }
    }
}

/// 监听器事件，由 `ChannelListener` 发出
#[derive(Debug)]
pub enum LoadEvent {
    Progress(u8),
    Finished(LoadOutcome),
}

/// 把回调转换为结果通道的监听器
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<LoadEvent>,
}

impl ChannelListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LoadEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Arc::new(Self { sender }), receiver)
    }

    fn send(&self, event: LoadEvent) {
        if self.sender.send(event).is_err() {
            debug!("结果通道的接收端已关闭");
        }
    }
}

impl FileLoaderListener for ChannelListener {
    fn on_success(&self, document: Document) {
        self.send(LoadEvent::Finished(LoadOutcome::Success(document)));
    }

    fn on_error(&self, error: LoaderError) {
        self.send(LoadEvent::Finished(LoadOutcome::Failure(error)));
    }

    fn on_cancelled(&self) {
        self.send(LoadEvent::Finished(LoadOutcome::Cancelled));
    }

    fn on_progress(&self, progress: u8) {
        self.send(LoadEvent::Progress(progress));
    }
}

/// 每个加载器实例的状态，供任意线程读取
#[derive(Debug, Default)]
struct LoaderState {
    initialized: AtomicBool,
    loading: AtomicBool,
    progress: AtomicU8,
}

#[derive(Clone)]
struct Notifier {
    listener: Arc<dyn FileLoaderListener>,
    executor: Arc<dyn CompletionExecutor>,
}

impl Notifier {
    fn progress(&self, progress: u8) {
        let listener = Arc::clone(&self.listener);
        self.executor
            .execute(Box::new(move || listener.on_progress(progress)));
    }

    fn outcome(&self, outcome: LoadOutcome) {
        let listener = Arc::clone(&self.listener);
        self.executor
            .execute(Box::new(move || outcome.deliver(listener.as_ref())));
    }
}

/// 计算百分比进度：已传输 / 预期总量；总量未知时返回None（不确定进度）
pub fn progress_percent(transferred: u64, expected: u64) -> Option<u8> {
    if expected == 0 {
        return None;
    }

    let clamped = transferred.min(expected) as u128;
    Some((clamped * 100 / expected as u128) as u8)
}

/// 进度上报句柄，可以克隆进上传回调
#[derive(Clone)]
pub struct ProgressReporter {
    state: Arc<LoaderState>,
    notifier: Option<Notifier>,
}

impl ProgressReporter {
    /// 上报百分比进度（超过100按100处理）；值变化时通知监听器
    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.state.progress.swap(percent, Ordering::SeqCst);
        if previous != percent {
            if let Some(notifier) = &self.notifier {
                notifier.progress(percent);
            }
        }
    }

    /// 按字节数上报进度
    pub fn report_bytes(&self, transferred: u64, expected: u64) {
        if let Some(percent) = progress_percent(transferred, expected) {
            self.report(percent);
        }
    }

    pub fn current(&self) -> u8 {
        self.state.progress.load(Ordering::SeqCst)
    }
}

/// 单次加载的执行上下文：取消令牌与进度上报
pub struct LoadContext {
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl LoadContext {
    /// 不绑定任何加载器实例的上下文，用于直接驱动 `FileLoader`
    pub fn detached() -> Self {
        Self {
            cancel: CancellationToken::new(),
            progress: ProgressReporter {
                state: Arc::new(LoaderState::default()),
                notifier: None,
            },
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// 检查点：已取消时返回 `LoaderError::Cancelled`
    pub fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(LoaderError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }
}

/// `load_async` 返回的句柄
#[derive(Debug, Clone)]
pub struct LoadHandle {
    token: CancellationToken,
    kind: LoaderKind,
}

impl LoadHandle {
    /// 请求取消；加载会在下一个检查点停止并以 `on_cancelled` 结束
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 接手该加载的加载器
    pub fn loader_kind(&self) -> LoaderKind {
        self.kind
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

struct Job {
    options: LoadOptions,
    token: CancellationToken,
}

struct Binding {
    sender: mpsc::UnboundedSender<Job>,
    notifier: Notifier,
    _worker: JoinHandle<()>,
}

/// 加载器生命周期包装
pub struct LoaderRunner {
    loader: Arc<dyn FileLoader>,
    state: Arc<LoaderState>,
    binding: Mutex<Option<Binding>>,
}

impl LoaderRunner {
    pub fn new<L: FileLoader + 'static>(loader: L) -> Self {
        Self::from_arc(Arc::new(loader))
    }

    pub fn from_arc(loader: Arc<dyn FileLoader>) -> Self {
        Self {
            loader,
            state: Arc::new(LoaderState::default()),
            binding: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> LoaderKind {
        self.loader.kind()
    }

    pub fn is_supported(&self, options: &LoadOptions) -> bool {
        self.loader.is_supported(options)
    }

    /// 分配后台工作者并记录回调目标；每个实例只能调用一次，需要在tokio运行时内调用
    pub fn initialize(
        &self,
        listener: Arc<dyn FileLoaderListener>,
        executor: Arc<dyn CompletionExecutor>,
    ) -> Result<()> {
        let mut binding = self.binding.lock();
        if binding.is_some() {
            return Err(loader_error!(failure, "加载器 {} 已经初始化", self.kind()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| LoaderError::LoadFailure {
            source: anyhow::Error::new(e).context("初始化加载器需要tokio运行时"),
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let notifier = Notifier { listener, executor };
        let worker = runtime.spawn(run_worker(
            Arc::clone(&self.loader),
            Arc::clone(&self.state),
            notifier.clone(),
            receiver,
        ));

        *binding = Some(Binding {
            sender,
            notifier,
            _worker: worker,
        });
        self.state.initialized.store(true, Ordering::SeqCst);

        info!("🔧 加载器已初始化: {}", self.kind());
        Ok(())
    }

    /// 把加载排入后台队列并立即返回；结果通过监听器在完成上下文上投递
    ///
    /// 正在加载时再次调用不会被拒绝，新请求排在前一个之后。
    pub fn load_async(&self, options: LoadOptions) -> Result<LoadHandle> {
        let binding = self.binding.lock();
        let binding = binding.as_ref().ok_or(LoaderError::NotInitialized)?;

        let token = CancellationToken::new();
        binding
            .sender
            .send(Job {
                options,
                token: token.clone(),
            })
            .map_err(|_| loader_error!(failure, "加载器 {} 的后台工作者已停止", self.kind()))?;

        debug!("加载请求已入队: {}", self.kind());
        Ok(LoadHandle {
            token,
            kind: self.kind(),
        })
    }

    /// 在调用方的任务上直接执行加载并返回终态；不经过监听器
    pub async fn load(&self, options: &LoadOptions) -> LoadOutcome {
        self.load_with_token(options, CancellationToken::new()).await
    }

    /// 同 `load`，使用调用方提供的取消令牌
    pub async fn load_with_token(
        &self,
        options: &LoadOptions,
        token: CancellationToken,
    ) -> LoadOutcome {
        if !self.is_initialized() {
            return LoadOutcome::Failure(LoaderError::NotInitialized);
        }

        let notifier = self
            .binding
            .lock()
            .as_ref()
            .map(|binding| binding.notifier.clone());
        let context = LoadContext {
            cancel: token,
            progress: ProgressReporter {
                state: Arc::clone(&self.state),
                notifier,
            },
        };

        execute(self.loader.as_ref(), &self.state, options, context).await
    }

    /// 最近一次上报的进度（0-100）
    pub fn progress(&self) -> u8 {
        self.state.progress.load(Ordering::SeqCst)
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized.load(Ordering::SeqCst)
    }

    /// 停止接收新请求并释放监听器引用
    ///
    /// 已排队的请求仍会按顺序执行完毕，之后调用 `FileLoader::release` 丢弃环境句柄。
    /// 进行中的网络或翻译操作不会被强行中断；
    /// 需要提前结束时应先通过 `LoadHandle::cancel` 取消。重复关闭是空操作。
    pub fn close(&self) {
        let binding = self.binding.lock().take();
        match binding {
            Some(binding) => {
                self.state.initialized.store(false, Ordering::SeqCst);
                drop(binding);
                info!("加载器已关闭: {}", self.kind());
            }
            None => debug!("加载器未初始化或已关闭: {}", self.kind()),
        }
    }
}

async fn run_worker(
    loader: Arc<dyn FileLoader>,
    state: Arc<LoaderState>,
    notifier: Notifier,
    mut receiver: mpsc::UnboundedReceiver<Job>,
) {
    while let Some(job) = receiver.recv().await {
        let context = LoadContext {
            cancel: job.token,
            progress: ProgressReporter {
                state: Arc::clone(&state),
                notifier: Some(notifier.clone()),
            },
        };

        let outcome = execute(loader.as_ref(), &state, &job.options, context).await;
        notifier.outcome(outcome);
    }

    loader.release();
    debug!("后台工作者退出: {}", loader.kind());
}

/// 执行一次加载，把所有失败（包括panic）收敛为单一终态
async fn execute(
    loader: &dyn FileLoader,
    state: &LoaderState,
    options: &LoadOptions,
    context: LoadContext,
) -> LoadOutcome {
    let kind = loader.kind();
    if context.is_cancelled() {
        info!("加载在开始前已取消: {}", options.locator());
        return LoadOutcome::Cancelled;
    }

    state.loading.store(true, Ordering::SeqCst);
    state.progress.store(0, Ordering::SeqCst);
    info!("📂 开始加载 [{}]: {}", kind, options.locator());

    let result = AssertUnwindSafe(loader.load(options, &context))
        .catch_unwind()
        .await;

    let outcome = match result {
        Ok(Ok(document)) => LoadOutcome::Success(document),
        Ok(Err(LoaderError::Cancelled)) => LoadOutcome::Cancelled,
        Ok(Err(error)) => LoadOutcome::Failure(error),
        Err(_) => LoadOutcome::Failure(loader_error!(failure, "加载器 {} 在加载过程中崩溃", kind)),
    };

    state.loading.store(false, Ordering::SeqCst);

    match &outcome {
        LoadOutcome::Success(document) => {
            info!("✅ 加载完成 [{}]: {} 页", kind, document.len())
        }
        LoadOutcome::Failure(error) => error!("❌ 加载失败 [{}]: {}", kind, error),
        LoadOutcome::Cancelled => info!("加载已取消 [{}]", kind),
    }

    outcome
}
