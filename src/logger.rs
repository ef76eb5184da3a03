//! 日志初始化模块
use anyhow::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// 初始化全局 tracing 订阅者
///
/// 优先使用 RUST_LOG，未设置时回退到配置中的级别。
/// 每个进程只能初始化一次，重复调用返回错误，调用方可以忽略。
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))?;

    let fmt_layer = fmt::layer().with_target(true).with_level(true).compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        // 第二次初始化不能 panic
        let _ = init_logging(&config);
        tracing::info!("[LOGGER] test message");
    }
}
