//! Authrix 凭证服务主程序
//!
//! 加载配置、初始化日志、启动 IAM HTTP 服务，并提供密钥运维子命令

mod cli;
mod error;
mod observability;

use anyhow::Context;
use authrix::AuthrixConfig;
use clap::Parser;
use observability::init_observability;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

macro_rules! bootstrap_info {
    ($($arg:tt)*) => {
        println!($($arg)*);
    };
}

macro_rules! bootstrap_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

use cli::{Cli, Commands};
use error::{Error, Result};

/// Application launcher utilities
struct ApplicationLauncher;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Test { config_file }) => {
            let config_path =
                ApplicationLauncher::find_config_file(config_file.as_ref().unwrap_or(&cli.config))?;
            ApplicationLauncher::test_config_file(&config_path)
        }
        Some(Commands::Seal { input }) => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;
            let config = ApplicationLauncher::load_config(&config_path)?;
            let envelope = authrix::seal_pem(&config, input)?;
            println!("{envelope}");
            Ok(())
        }
        Some(Commands::ImportKey {
            tenant,
            kid,
            public,
            private,
        }) => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;
            let config = ApplicationLauncher::load_config(&config_path)?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let record = runtime.block_on(authrix::import_key_files(
                &config, tenant, kid, public, private,
            ))?;
            bootstrap_info!(
                "✅ 已导入租户 {} 的签名密钥: kid={}, id={}",
                record.tenant_id,
                record.key_id,
                record.id
            );
            Ok(())
        }
        None => {
            let config_path = ApplicationLauncher::find_config_file(&cli.config)?;

            // Create Tokio runtime（before running the application）
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            // Run the asynchronous application
            runtime.block_on(ApplicationLauncher::run_application(&config_path))
        }
    }
}

impl ApplicationLauncher {
    /// Find config file with fallback locations
    fn find_config_file(provided_path: &PathBuf) -> Result<PathBuf> {
        // If the provided path is not the default "config.toml", check if it exists
        if provided_path != Path::new("config.toml") {
            if provided_path.exists() {
                bootstrap_info!("Using provided config file: {:?}", provided_path);
                return Ok(provided_path.clone());
            } else {
                bootstrap_error!("Provided config file not found: {:?}", provided_path);
                return Err(Error::custom(format!(
                    "Config file not found: {provided_path:?}"
                )));
            }
        }

        // Otherwise, try fallback locations
        let fallback_paths = vec![
            // 1. Current working directory
            PathBuf::from("config.toml"),
            // 2. System config directory
            PathBuf::from("/etc/authrix/config.toml"),
        ];

        bootstrap_info!("Searching for config file in default locations...");

        for path in &fallback_paths {
            if path.exists() {
                bootstrap_info!("Found config file: {:?}", path);
                return Ok(path.clone());
            } else {
                bootstrap_info!("Config not found at: {:?}", path);
            }
        }

        // If no config file found, provide helpful error message
        bootstrap_error!("No configuration file found!");
        bootstrap_error!("Please create a config file in one of these locations:");
        for (i, path) in fallback_paths.iter().enumerate() {
            bootstrap_error!("  {}. {:?}", i + 1, path);
        }
        bootstrap_error!("Or specify a custom path with: authrix --config <path>");

        Err(Error::custom(
            "No configuration file found. Please create one or specify path with --config",
        ))
    }

    /// 加载并验证配置，错误中止，警告仅打印
    fn load_config(config_path: &Path) -> Result<AuthrixConfig> {
        bootstrap_info!("📄 加载配置文件: {:?}", config_path);

        let config = match AuthrixConfig::from_file(config_path) {
            Ok(config) => config,
            Err(e) => {
                bootstrap_error!("❌ 配置加载失败: {}", e);
                return Err(Error::custom(format!("配置加载失败: {e}")));
            }
        };
        bootstrap_info!("✅ 配置加载成功");

        if let Err(errors) = config.validate() {
            let mut has_critical_errors = false;
            for (i, err) in errors.iter().enumerate() {
                if err.starts_with("Warning:") {
                    bootstrap_info!("  {}. ⚠️  {}", i + 1, err);
                } else {
                    bootstrap_error!("  {}. ❌ {}", i + 1, err);
                    has_critical_errors = true;
                }
            }
            if has_critical_errors {
                bootstrap_error!("❌ 配置验证失败，请修复上述错误");
                return Err(Error::service_validation("配置验证失败".to_string()));
            }
        }

        Ok(config)
    }

    /// 测试配置文件是否有效
    fn test_config_file(config_path: &Path) -> Result<()> {
        // Initialize basic logging for test command
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();

        match AuthrixConfig::from_file(config_path) {
            Ok(config) => {
                info!("✅ 配置文件解析成功: {:?}", config_path);

                // 验证配置
                match config.validate() {
                    Ok(()) => {
                        info!("✅ 配置验证通过");
                    }
                    Err(errors) => {
                        for (i, err) in errors.iter().enumerate() {
                            if err.starts_with("Warning:") {
                                warn!("  {}. ⚠️  {}", i + 1, err);
                            } else {
                                error!("  {}. ❌ {}", i + 1, err);
                            }
                        }
                        // 检查是否有非警告错误
                        let has_errors = errors.iter().any(|e| !e.starts_with("Warning:"));
                        if has_errors {
                            bootstrap_error!("❌ 配置验证失败");
                            return Err(Error::service_validation("配置验证失败".to_string()));
                        }
                    }
                }

                info!("✅ 完整配置验证通过");
                Ok(())
            }
            Err(e) => {
                bootstrap_error!("❌ 配置文件解析失败: {}", e);
                Err(Error::service_validation(format!("配置解析失败: {e}")))
            }
        }
    }

    /// 运行应用程序的主入口
    async fn run_application(config_path: &Path) -> Result<()> {
        let config = Self::load_config(config_path)?;

        // ensure sqlite_path directory exists
        if !config.sqlite_path.exists() {
            std::fs::create_dir_all(&config.sqlite_path).with_context(|| {
                format!(
                    "Failed to create SQLite data directory: {}",
                    config.sqlite_path.display()
                )
            })?;
        }

        // 初始化日志系统
        let observability_guard = init_observability(&config)?;
        if observability_guard.has_file_writer() {
            bootstrap_info!("日志写入文件: {}", config.log_config().path);
        }

        if let Err(errors) = config.validate() {
            for warning in errors.iter().filter(|e| e.starts_with("Warning:")) {
                warn!("{}", warning);
            }
        }

        info!(
            "🚀 启动 Authrix 凭证服务: name={}, env={}",
            config.name, config.env
        );

        authrix::serve(&config, shutdown_signal())
            .await
            .map_err(|e| Error::service_startup(format!("{e:#}")))?;

        info!("🛑 所有服务已安全关闭");
        drop(observability_guard);
        Ok(())
    }
}

/// 等待 Ctrl-C 信号
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听Ctrl-C信号: {}", e);
        // 无法监听信号时保持运行
        std::future::pending::<()>().await;
    }
    info!("收到Ctrl-C信号，开始优雅关闭...");
}
