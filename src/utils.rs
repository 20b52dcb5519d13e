use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use url::Url;

/// 初始化日志系统
///
/// 设置了 `RUST_LOG` 时以其为准，否则按 verbose 选择 debug 或 info 级别。
pub fn init_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// 把命令行输入解析为定位符
///
/// 已经是带scheme的URL（http、https、file、content等）时原样返回，
/// 否则按本地路径处理，相对路径会转换为绝对路径。
pub fn parse_locator(input: &str) -> Result<Url> {
    let input = input.trim();
    if input.is_empty() {
        anyhow::bail!("输入不能为空");
    }

    if let Ok(url) = Url::parse(input) {
        // 单字母scheme是Windows盘符，不当作URL
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }

    let path = PathBuf::from(input);
    let absolute_path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("获取当前目录失败")?
            .join(path)
    };

    Url::from_file_path(&absolute_path)
        .map_err(|_| anyhow::anyhow!("无法转换为文件定位符: {}", absolute_path.display()))
}

/// 定位符的最后一个路径段（已解码），用作显示名称的兜底
pub fn locator_file_name(locator: &Url) -> Option<String> {
    let segment = locator
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())?;

    let decoded = urlencoding::decode(segment)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| segment.to_string());

    // 内容提供者常把路径编码进单个段，如 primary:Download/a.pdf
    let name = decoded
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(&decoded)
        .to_string();

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// 规范化MIME类型：去掉参数、去除空白并转为小写；空值返回None
pub fn normalize_mime_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if essence.is_empty() || !essence.contains('/') {
        None
    } else {
        Some(essence)
    }
}
