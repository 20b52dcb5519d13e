//! 磁盘缓存模块
//!
//! 此模块负责：
//! - 为翻译输出和内嵌资源创建、解析命名文件
//! - 将输入流物化为本地可寻址的缓存文件
//! - 提供"不存在才创建"的原子语义，避免同名并发创建互相覆盖
//! - 按调用方的存储策略显式清理条目
//!
//! 缓存可在多个加载、多个加载器实例之间共享（通常包装在 `Arc` 中）。
//! 不同名称之间的读写互不干扰；名称由 `unique_name` 生成以避免冲突。

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::constants::cache_config;

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 缓存根目录
    pub root_dir: PathBuf,
    /// 生成文件名时使用的前缀
    pub file_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: std::env::temp_dir().join(cache_config::CACHE_DIR_NAME),
            file_prefix: cache_config::FILE_PREFIX.to_string(),
        }
    }
}

/// 基于本地磁盘的命名文件缓存
#[derive(Debug)]
pub struct FileCache {
    config: CacheConfig,
}

impl FileCache {
    /// 创建缓存，确保根目录存在；相对路径会基于当前目录转换为绝对路径
    pub fn new(mut config: CacheConfig) -> Result<Self> {
        if config.root_dir.is_relative() {
            config.root_dir = std::env::current_dir()
                .context("获取当前目录失败")?
                .join(&config.root_dir);
        }

        let cache = Self { config };
        cache.ensure_root_exists()?;

        Ok(cache)
    }

    /// 使用默认配置创建缓存
    pub fn with_defaults() -> Result<Self> {
        Self::new(CacheConfig::default())
    }

    /// 缓存根目录
    pub fn cache_root(&self) -> &Path {
        &self.config.root_dir
    }

    /// 把名称解析为缓存内的文件路径
    ///
    /// 名称可以包含子目录，但不能是绝对路径或跳出根目录。
    pub fn file_for(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let valid = !name.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            anyhow::bail!("非法的缓存条目名称: {:?}", name);
        }

        Ok(self.config.root_dir.join(relative))
    }

    /// 条目是否存在
    pub fn exists(&self, name: &str) -> bool {
        self.file_for(name).map(|path| path.is_file()).unwrap_or(false)
    }

    /// 生成唯一的条目名称：`<前缀>_<uuid>.<后缀>`
    pub fn unique_name(&self, suffix: &str) -> String {
        let suffix = suffix.trim_start_matches('.');
        if suffix.is_empty() {
            format!("{}_{}", self.config.file_prefix, Uuid::new_v4().simple())
        } else {
            format!(
                "{}_{}.{}",
                self.config.file_prefix,
                Uuid::new_v4().simple(),
                suffix
            )
        }
    }

    /// 不存在才创建
    ///
    /// 返回 `Some(File)` 表示本次调用创建了该条目；条目已存在时返回 `None`，
    /// 已有内容不会被截断。同名并发创建时只有一个调用者拿到文件。
    pub fn create_if_absent(&self, name: &str) -> Result<Option<File>> {
        let path = self.file_for(name)?;
        self.ensure_parent_exists(&path)?;

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                debug!("创建缓存条目: {}", path.display());
                Ok(Some(file))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e).with_context(|| format!("创建缓存条目失败: {}", path.display())),
        }
    }

    /// 打开条目用于写入（存在则截断）
    pub fn open_writer(&self, name: &str) -> Result<File> {
        let path = self.file_for(name)?;
        self.ensure_parent_exists(&path)?;

        File::create(&path).with_context(|| format!("打开缓存条目失败: {}", path.display()))
    }

    /// 写入内容到条目
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf> {
        let path = self.file_for(name)?;
        let mut file = self.open_writer(name)?;
        file.write_all(content)
            .with_context(|| format!("写入缓存条目失败: {}", path.display()))?;

        debug!("写入缓存条目完成: {} ({} 字节)", path.display(), content.len());

        Ok(path)
    }

    /// 读取条目内容
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.file_for(name)?;
        fs::read(&path).with_context(|| format!("读取缓存条目失败: {}", path.display()))
    }

    /// 把字节流完整写入一个新生成的唯一条目，返回条目名称
    pub async fn store_stream<R>(&self, suffix: &str, mut reader: R) -> Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let name = self.unique_name(suffix);
        let path = self.file_for(&name)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("创建缓存条目失败: {}", path.display()))?;

        let copied = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(copied) => copied,
            Err(e) => {
                // 半截条目的名称不会返回给调用方，只能在这里删掉
                drop(file);
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!("清理不完整的缓存条目失败 {}: {}", path.display(), remove_err);
                }
                return Err(e)
                    .with_context(|| format!("复制输入流到缓存失败: {}", path.display()));
            }
        };

        debug!("输入流已缓存: {} ({} 字节)", path.display(), copied);

        Ok(name)
    }

    /// 清理单个条目；条目不存在不算错误
    pub fn evict(&self, name: &str) -> Result<()> {
        let path = self.file_for(name)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("清理缓存条目: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("清理缓存条目失败: {}", path.display())),
        }
    }

    /// 清空整个缓存目录并重新创建
    pub fn clear(&self) -> Result<()> {
        info!("开始清理缓存目录: {}", self.config.root_dir.display());

        let mut errors = Vec::new();
        let entries = fs::read_dir(&self.config.root_dir)
            .with_context(|| format!("读取缓存目录失败: {}", self.config.root_dir.display()))?;

        for entry in entries.flatten() {
            let path = entry.path();
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            if let Err(e) = removed {
                errors.push(format!("{}: {}", path.display(), e));
            }
        }

        if !errors.is_empty() {
            warn!("清理过程中遇到错误: {:?}", errors);
        } else {
            info!("缓存清理完成");
        }

        Ok(())
    }

    /// 确保根目录存在
    fn ensure_root_exists(&self) -> Result<()> {
        if !self.config.root_dir.exists() {
            fs::create_dir_all(&self.config.root_dir).with_context(|| {
                format!("创建缓存根目录失败: {}", self.config.root_dir.display())
            })?;
            debug!("创建缓存根目录: {}", self.config.root_dir.display());
        }
        Ok(())
    }

    fn ensure_parent_exists(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("创建缓存子目录失败: {}", parent.display()))?;
            }
        }
        Ok(())
    }
}
