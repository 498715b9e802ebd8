use crate::config::LoggingConfig;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

/// ログファイル名
pub const LOG_FILE_NAME: &str = "cost-anomaly.log";

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// ログディレクトリ（None ならファイル出力なし）
    pub log_dir: Option<PathBuf>,
    /// ファイルローテーション設定
    pub rotation: LogRotation,
    /// JSON 形式で出力
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LogRotation {
    /// 日次ローテーション
    Daily,
    /// 時間毎ローテーション
    Hourly,
    /// ローテーションなし
    Never,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            rotation: LogRotation::Daily,
            json: false,
        }
    }
}

impl LogConfig {
    /// 設定からログ設定を作成
    pub fn from_logging_config(config: &LoggingConfig) -> Self {
        Self {
            level: config.level.clone(),
            log_dir: config.log_dir.clone(),
            json: config.json,
            ..Self::default()
        }
    }

    /// ローテーション設定
    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// `RUST_LOG` wins over the configured level.
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// ログシステムを初期化
///
/// The returned guard must be held until exit, otherwise buffered file output
/// is lost.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console = fmt::layer().with_writer(std::io::stderr).with_target(true);
    layers.push(if config.json {
        console.json().boxed()
    } else {
        console.boxed()
    });

    let guard = match &config.log_dir {
        Some(dir) => {
            ensure_log_dir(dir)?;
            let file_appender = match config.rotation {
                LogRotation::Daily => rolling::daily(dir, LOG_FILE_NAME),
                LogRotation::Hourly => rolling::hourly(dir, LOG_FILE_NAME),
                LogRotation::Never => rolling::never(dir, LOG_FILE_NAME),
            };
            let (writer, guard) = non_blocking(file_appender);
            let file = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            layers.push(if config.json {
                file.json().boxed()
            } else {
                file.boxed()
            });
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter())
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        log_dir = ?config.log_dir,
        json = config.json,
        "logging initialized"
    );

    Ok(guard)
}
