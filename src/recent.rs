//! 最近文档记录
//!
//! 远程查看器加载器在探测阶段把 (显示名称, 定位符) 报告给记录器。
//! 持久化不在本框架范围内；这里只提供接口和一个内存实现。

// 第三方crate导入
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use url::Url;

/// 最近文档记录接口；写入失败只记录日志，不影响加载
pub trait RecentDocuments: Send + Sync {
    fn add_recent(&self, display_name: &str, locator: &Url) -> Result<()>;
}

/// 一条最近文档记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentEntry {
    pub display_name: String,
    pub locator: Url,
    pub opened_at: DateTime<Utc>,
}

/// 内存中的最近文档列表，最新的在前，按定位符去重
#[derive(Debug)]
pub struct MemoryRecentDocuments {
    capacity: usize,
    entries: Mutex<Vec<RecentEntry>>,
}

impl MemoryRecentDocuments {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<RecentEntry> {
        self.entries.lock().clone()
    }
}

impl Default for MemoryRecentDocuments {
    fn default() -> Self {
        Self::new(10)
    }
}

impl RecentDocuments for MemoryRecentDocuments {
    fn add_recent(&self, display_name: &str, locator: &Url) -> Result<()> {
        let mut entries = self.entries.lock();
        entries.retain(|entry| &entry.locator != locator);
        entries.insert(
            0,
            RecentEntry {
                display_name: display_name.to_string(),
                locator: locator.clone(),
                opened_at: Utc::now(),
            },
        );
        entries.truncate(self.capacity);
        Ok(())
    }
}
