/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有データベース接続管理
pub mod database;

/// 共有設定管理
pub mod config;

/// 共有ユーティリティ関数
pub mod utils;

// 便利な再エクスポート
pub use config::{
    get_environment, initialize_logging_system, load_environment_variables, AppConfig,
    Environment, EnvironmentConfig, PaginationConfig, StoreConfig,
};
pub use database::{create_tables, initialize_database, initialize_in_memory_database};
pub use errors::{AppError, AppResult, ErrorSeverity};
pub use utils::{months_inclusive, Month, MonthParseError};
