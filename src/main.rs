use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use document_loader::config::{Cli, LoaderConfig};
use document_loader::dispatcher::Dispatcher;
use document_loader::loader::{ChannelListener, LoadEvent, LoadOutcome, LoaderRunner, MainContext};
use document_loader::recent::MemoryRecentDocuments;
use document_loader::remote_loader::RemoteViewerLoader;
use document_loader::resolver::{CompositeResolver, ContentResolver};
use document_loader::stats::{print_load_report, Elapsed, LoadReport};
use document_loader::storage::{FirebaseStorage, RemoteStorage};
use document_loader::utils::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    init_logging(cli.verbose, cli.quiet);

    // 开始计时
    let total_start = Instant::now();

    match load_document(&cli).await {
        Ok(report) => {
            let total_duration = total_start.elapsed();
            info!("✅ 加载完成！总耗时: {}", Elapsed(total_duration));

            if cli.stats || cli.verbose {
                print_load_report(&report, total_duration);
            }
        }
        Err(e) => {
            error!("❌ 加载失败: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 构建调度器、执行一次加载并打印页面
///
/// 命令行不携带结构化文档翻译后端，所有请求都由远程查看器加载器处理。
async fn load_document(cli: &Cli) -> Result<LoadReport> {
    let setup_start = Instant::now();

    let config = cli.apply(LoaderConfig::from_env()?);
    let options = cli.load_options()?;

    let resolver: Arc<dyn ContentResolver> = Arc::new(CompositeResolver::new()?);
    let storage: Arc<dyn RemoteStorage> = Arc::new(FirebaseStorage::new(config.storage().clone())?);
    let remote = RemoteViewerLoader::new(resolver, storage)
        .with_config(config.viewer().clone())
        .with_recent(Arc::new(MemoryRecentDocuments::default()));

    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Arc::new(LoaderRunner::new(remote)));

    let main_context = MainContext::new();
    let (listener, mut events) = ChannelListener::new();
    dispatcher.initialize_all(listener, main_context.executor())?;
    let setup_time = setup_start.elapsed();

    info!("📂 输入: {}", options.locator());
    let load_start = Instant::now();
    let (loader, handle) = dispatcher.dispatch(options)?;

    let mut progress_updates = 0;
    let mut interrupted = false;
    let outcome: LoadOutcome = 'drive: loop {
        tokio::select! {
            _ = main_context.run_next() => {}
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("收到中断信号，正在取消加载");
                interrupted = true;
                handle.cancel();
            }
        }

        while let Ok(event) = events.try_recv() {
            match event {
                LoadEvent::Progress(progress) => {
                    progress_updates += 1;
                    info!("⏳ 进度: {}%", progress);
                }
                LoadEvent::Finished(outcome) => break 'drive outcome,
            }
        }
    };
    let load_time = load_start.elapsed();
    dispatcher.close_all();

    let document = outcome.into_result()?;
    for page in document.pages() {
        println!("{}\t{}\t{}", page.index(), page.title(), page.uri());
    }

    Ok(LoadReport {
        loader,
        setup_time,
        load_time,
        pages: document.len(),
        progress_updates,
    })
}
