use super::environment::{get_database_filename, Environment};
use crate::shared::errors::{AppError, AppResult};
use chrono_tz::Tz;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// データディレクトリ配下のアプリケーション用ディレクトリ名
const APP_DIR_NAME: &str = "subscription-tracker";

/// ストアの設定
///
/// ストアのコンストラクタに明示的に渡す。
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLiteファイルのパス
    pub database_path: PathBuf,
    /// created_at / updated_at を記録するタイムゾーン
    pub timezone: Tz,
    /// 起動時にテーブルとインデックスを作成するか
    pub run_migrations: bool,
}

/// 一覧取得のページング設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationConfig {
    /// limit 未指定時の件数
    pub default_limit: u32,
    /// limit の上限
    pub max_limit: u32,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// アプリケーション全体の設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 実行環境
    pub environment: Environment,
    /// 待ち受けアドレス
    pub host: IpAddr,
    /// 待ち受けポート
    pub port: u16,
    /// ストア設定
    pub store: StoreConfig,
    /// ページング設定
    pub pagination: PaginationConfig,
    /// シャットダウン時に接続の終了を待つ最大時間
    pub shutdown_timeout: Duration,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 引数
    /// * `environment` - 実行環境
    ///
    /// # 戻り値
    /// 設定、または値が不正な場合は設定エラー
    pub fn from_env(environment: Environment) -> AppResult<Self> {
        Self::from_lookup(environment, |key| std::env::var(key).ok())
    }

    /// 任意の取得関数から設定を読み込む
    ///
    /// # 読み込む項目
    /// - `HOST`（デフォルト: 0.0.0.0）
    /// - `PORT`（デフォルト: 7777）
    /// - `DATABASE_PATH`（デフォルト: データディレクトリ配下）
    /// - `APP_TIMEZONE`（デフォルト: UTC）
    /// - `DISABLE_AUTO_MIGRATION`（デフォルト: false）
    /// - `DEFAULT_PAGE_SIZE` / `MAX_PAGE_SIZE`（デフォルト: 20 / 100）
    /// - `SHUTDOWN_TIMEOUT_SECS`（デフォルト: 10）
    pub fn from_lookup<F>(environment: Environment, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host: IpAddr = parse_or(&lookup, "HOST", IpAddr::from([0, 0, 0, 0]))?;
        let port: u16 = parse_or(&lookup, "PORT", 7777)?;

        let database_path = match non_blank(&lookup, "DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_database_path(environment)?,
        };

        let timezone = match non_blank(&lookup, "APP_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| {
                AppError::configuration(format!("APP_TIMEZONE の値が不正です: {name} ({e})"))
            })?,
            None => chrono_tz::UTC,
        };

        let disable_auto_migration = parse_flag(&lookup, "DISABLE_AUTO_MIGRATION")?;

        let defaults = PaginationConfig::default();
        let pagination = PaginationConfig {
            default_limit: parse_or(&lookup, "DEFAULT_PAGE_SIZE", defaults.default_limit)?,
            max_limit: parse_or(&lookup, "MAX_PAGE_SIZE", defaults.max_limit)?,
        };
        validate_pagination(&pagination)?;

        let shutdown_timeout = Duration::from_secs(parse_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?);

        Ok(Self {
            environment,
            host,
            port,
            store: StoreConfig {
                database_path,
                timezone,
                run_migrations: !disable_auto_migration,
            },
            pagination,
            shutdown_timeout,
        })
    }

    /// 待ち受けソケットアドレス
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// 実行環境ごとのデフォルトのデータベースパス
pub fn default_database_path(environment: Environment) -> AppResult<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| {
        AppError::configuration("データディレクトリを特定できません。DATABASE_PATH を設定してください")
    })?;

    Ok(data_dir
        .join(APP_DIR_NAME)
        .join(get_database_filename(environment)))
}

fn non_blank<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match non_blank(lookup, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| AppError::configuration(format!("{key} の値が不正です: {raw} ({e})"))),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> AppResult<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match non_blank(lookup, key).map(|v| v.to_lowercase()) {
        None => Ok(false),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(AppError::configuration(format!(
            "{key} は true または false で指定してください: {v}"
        ))),
    }
}

fn validate_pagination(pagination: &PaginationConfig) -> AppResult<()> {
    if pagination.max_limit == 0 {
        return Err(AppError::configuration("MAX_PAGE_SIZE は1以上で指定してください"));
    }
    if pagination.default_limit == 0 || pagination.default_limit > pagination.max_limit {
        return Err(AppError::configuration(
            "DEFAULT_PAGE_SIZE は1以上かつ MAX_PAGE_SIZE 以下で指定してください",
        ));
    }
    Ok(())
}
