use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `COST_ANOMALY_DETECTION__WINDOW_LENGTH=7`
pub const ENV_PREFIX: &str = "COST_ANOMALY";

const CONFIG_PATHS: [&str; 2] = ["cost-anomaly.toml", "config/cost-anomaly.toml"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    pub detection: DetectionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// 異常検知のしきい値設定
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// 移動ウィンドウ長（日数）
    pub window_length: usize,
    pub upper_band_coefficient: f64,
    pub std_dev_coefficient: f64,
    /// 日次請求額に対する最小増加率（%）
    pub min_percent_of_daily_bill: f64,
    pub min_absolute_cost: f64,
    /// 上位支出製品の数
    pub podium_size: usize,
    /// 定期異常の許容誤差（割合）
    pub recurrence_tolerance: f64,
    /// 検知対象期間（当日を除く日数）
    pub look_back_days: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_length: 3,
            upper_band_coefficient: 1.0,
            std_dev_coefficient: 2.0,
            min_percent_of_daily_bill: 1.0,
            min_absolute_cost: 5.0,
            podium_size: 3,
            recurrence_tolerance: 0.1,
            look_back_days: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub endpoint: String,
    /// 課金明細のインデックス
    pub billing_index: String,
    /// 異常ドキュメントのインデックス接頭辞（`<prefix>-<account>`）
    pub anomaly_index_prefix: String,
    pub timeout_seconds: u64,
    pub bulk_batch_size: usize,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9200".to_string(),
            billing_index: "billing-line-items".to_string(),
            anomaly_index_prefix: "anomalies-product".to_string(),
            timeout_seconds: 30,
            bulk_batch_size: crate::store::bulk::DEFAULT_BATCH_SIZE,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// 指定時のみファイル出力
    pub log_dir: Option<PathBuf>,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            json: false,
        }
    }
}

impl AppConfig {
    /// 設定ファイルから読み込み、環境変数で上書き
    ///
    /// `path` is used when given; otherwise the first existing default path
    /// is read, if any.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        // デフォルト値を設定
        settings = settings.add_source(config::Config::try_from(&AppConfig::default())?);

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path));
            }
            None => {
                if let Some(path) = CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
                    settings = settings.add_source(config::File::with_name(path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.window_length == 0 {
            return Err(invalid("detection.window_length must be at least 1"));
        }
        if d.podium_size == 0 {
            return Err(invalid("detection.podium_size must be at least 1"));
        }
        let non_negative = [
            ("detection.upper_band_coefficient", d.upper_band_coefficient),
            ("detection.std_dev_coefficient", d.std_dev_coefficient),
            ("detection.min_percent_of_daily_bill", d.min_percent_of_daily_bill),
            ("detection.min_absolute_cost", d.min_absolute_cost),
        ];
        if let Some((name, _)) = non_negative.iter().find(|(_, v)| !(*v >= 0.0)) {
            return Err(invalid(&format!("{} must be non-negative", name)));
        }
        if !(0.0..=1.0).contains(&d.recurrence_tolerance) {
            return Err(invalid("detection.recurrence_tolerance must be within [0, 1]"));
        }
        if self.store.bulk_batch_size == 0 {
            return Err(invalid("store.bulk_batch_size must be at least 1"));
        }
        Ok(())
    }

    /// サンプル設定ファイルの内容を生成
    pub fn sample_config() -> Result<String> {
        let body = toml::to_string_pretty(&AppConfig::default())
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        Ok(format!(
            "# cost-anomaly configuration\n\
             #\n\
             # Save as cost-anomaly.toml. Every value can be overridden from the\n\
             # environment, e.g. {}_DETECTION__WINDOW_LENGTH=7\n\n{}",
            ENV_PREFIX, body
        ))
    }
}

fn invalid(message: &str) -> Error {
    Error::InvalidConfiguration(message.to_string())
}
