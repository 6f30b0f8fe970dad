use authrix_common::config::{AuthrixConfig, LogConfig};
use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::error::Result;

/// 日志文件名
const LOG_FILE_NAME: &str = "authrix.log";

/// Guard for observability resources (non-blocking log writer)
///
/// 必须在进程生命周期内保持存活，drop 时刷新缓冲日志。
#[derive(Default)]
pub struct ObservabilityGuard {
    log_guard: Option<WorkerGuard>,
}

impl ObservabilityGuard {
    pub fn has_file_writer(&self) -> bool {
        self.log_guard.is_some()
    }
}

/// Initialize logging based on configuration
pub fn init_observability(config: &AuthrixConfig) -> Result<ObservabilityGuard> {
    let mut guard = ObservabilityGuard::default();
    let log_config = config.log_config();

    if config.is_console_logging() {
        init_subscriber_with_writer(std::io::stdout, true, config);
    } else {
        fs::create_dir_all(&log_config.path)?;
        let (non_blocking, worker_guard) =
            build_file_writer(log_config, config.should_rotate_logs())?;
        guard.log_guard = Some(worker_guard);

        init_subscriber_with_writer(non_blocking, false, config);
    }

    Ok(guard)
}

/// Create an EnvFilter from config, with RUST_LOG taking precedence
fn create_env_filter(config: &AuthrixConfig) -> EnvFilter {
    let directive = config.get_filter_level();

    EnvFilter::try_new(&directive).unwrap_or_else(|_| {
        println!(
            "Failed to parse filter directive: {}. Falling back to default: info",
            directive
        );
        EnvFilter::new("info")
    })
}

fn fmt_layer<W>(writer: W, use_ansi: bool, json: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_line_number(true)
        .with_file(true)
        .with_writer(writer);

    if json {
        layer.json().with_current_span(true).boxed()
    } else {
        layer.with_ansi(use_ansi).boxed()
    }
}

fn init_subscriber_with_writer<W>(writer: W, use_ansi: bool, config: &AuthrixConfig)
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    // 过滤器作为全局层：事件先过滤再交给格式化层
    tracing_subscriber::registry()
        .with(fmt_layer(writer, use_ansi, config.is_json_logging()))
        .with(create_env_filter(config))
        .try_init()
        .ok();
}

fn build_file_writer(log_config: &LogConfig, rotate: bool) -> Result<(NonBlocking, WorkerGuard)> {
    println!("日志写入模式: 文件");
    println!("  - 路径: {}", log_config.path);
    println!("  - 轮转: {}", if rotate { "开启（按天）" } else { "关闭" });

    if rotate {
        let file_appender = tracing_appender::rolling::daily(&log_config.path, LOG_FILE_NAME);
        Ok(tracing_appender::non_blocking(file_appender))
    } else {
        let log_file_path = std::path::Path::new(&log_config.path).join(LOG_FILE_NAME);
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)?;
        Ok(tracing_appender::non_blocking(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_creates_log_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log_config = LogConfig {
            output: "file".to_string(),
            rotate: false,
            path: temp_dir.path().to_string_lossy().to_string(),
            format: "text".to_string(),
        };

        let (_writer, _guard) = build_file_writer(&log_config, false).unwrap();
        assert!(temp_dir.path().join(LOG_FILE_NAME).exists());
    }

    #[test]
    fn test_invalid_filter_falls_back_to_info() {
        let mut config = AuthrixConfig::default();
        config.observability.filter_level = "info,=[".to_string();
        // 仅验证不会 panic
        let _ = create_env_filter(&config);
    }
}
