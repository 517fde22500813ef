/// 実行環境とログ設定
pub mod environment;

/// アプリケーション設定
pub mod app_config;

pub use app_config::{default_database_path, AppConfig, PaginationConfig, StoreConfig};
pub use environment::{
    get_database_filename, get_environment, initialize_logging_system,
    load_environment_variables, Environment, EnvironmentConfig,
};
