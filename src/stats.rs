use std::fmt;
use std::time::Duration;

use crate::loader::LoaderKind;

/// 单次加载的统计
#[derive(Debug)]
pub struct LoadReport {
    pub loader: LoaderKind,
    pub setup_time: Duration,
    pub load_time: Duration,
    pub pages: usize,
    pub progress_updates: usize,
}

/// 打印加载统计
pub fn print_load_report(report: &LoadReport, total_duration: Duration) {
    println!("\n📊 加载统计报告:");
    println!("═══════════════════════════════════════");

    // 时间分解
    println!("⏱️  时间分解:");
    println!("   初始化: {}", Elapsed(report.setup_time));
    println!("   加载执行: {}", Elapsed(report.load_time));
    println!("   总耗时: {}", Elapsed(total_duration));

    // 结果统计
    println!("\n📄 结果统计:");
    println!("   加载器: {}", report.loader);
    println!("   页面数: {}", report.pages);
    println!("   进度更新: {} 次", report.progress_updates);
}

/// 耗时的显示形式：不足一秒用毫秒，否则用秒，超过一分钟再拆出分钟
#[derive(Debug, Clone, Copy)]
pub struct Elapsed(pub Duration);

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Elapsed(duration) = *self;
        let secs = duration.as_secs();
        match secs {
            0 => write!(f, "{}ms", duration.as_millis()),
            1..=59 => write!(f, "{:.3}s", duration.as_secs_f64()),
            _ => write!(f, "{}m{:02}s", secs / 60, secs % 60),
        }
    }
}
