//! 可观测性：tracing 订阅器初始化与日志辅助

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装 fmt 层与 EnvFilter（默认 info，可用 RUST_LOG 覆盖）
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// 日志中只保留 API Key 前 8 个字符
pub fn mask_api_key(key: &str) -> String {
    let visible: String = key.chars().take(8).collect();
    format!("{}...", visible)
}

/// 长文本预览：超过 n 个字符时截断并追加省略号
pub fn preview(text: &str, n: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= n {
        flat
    } else {
        let head: String = flat.chars().take(n).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-abcdefghijkl"), "sk-abcde...");
        assert_eq!(mask_api_key("short"), "short...");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("line1\nline2", 20), "line1 line2");
        assert_eq!(preview("建造一座塔楼", 2), "建造...");
    }
}
