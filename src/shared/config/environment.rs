/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

impl Environment {
    /// ログや設定ファイルで使う名前
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    /// LOG_LEVEL 未指定時のログレベル
    fn default_log_level(self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Production => "info",
        }
    }
}

/// 環境設定を管理する構造体
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// 実行環境
    pub environment: Environment,
    /// ログレベル
    pub log_level: String,
}

impl EnvironmentConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// 環境設定
    pub fn from_env() -> Self {
        Self::new(get_environment(), std::env::var("LOG_LEVEL").ok())
    }

    /// 実行環境とログレベル指定から設定を組み立てる
    ///
    /// ログレベルが指定されていなければ環境ごとの既定値を使う。
    pub fn new(environment: Environment, log_level: Option<String>) -> Self {
        let log_level =
            log_level.unwrap_or_else(|| environment.default_log_level().to_string());

        Self {
            environment,
            log_level,
        }
    }

    /// ログレベル文字列をフィルタ値に変換する
    ///
    /// 不明な値は info として扱う。
    pub fn level_filter(&self) -> log::LevelFilter {
        match self.log_level.to_lowercase().as_str() {
            "off" => log::LevelFilter::Off,
            "error" => log::LevelFilter::Error,
            "warn" => log::LevelFilter::Warn,
            "info" => log::LevelFilter::Info,
            "debug" => log::LevelFilter::Debug,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Info,
        }
    }
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. 実行時環境変数 ENVIRONMENT を確認
/// 2. デバッグビルドの場合は Development
/// 3. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = environment_from_value(&env_var);
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    // フォールバック: ビルド設定に基づく判定
    let env = if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    };
    log::debug!(
        "環境判定: ビルド設定を使用 -> debug_assertions={} -> {env:?}",
        cfg!(debug_assertions)
    );
    env
}

/// ENVIRONMENT の値を実行環境に変換する
pub fn environment_from_value(value: &str) -> Environment {
    match value {
        "production" => Environment::Production,
        _ => Environment::Development,
    }
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_subscriptions.db"
/// - プロダクション環境: "subscriptions.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_subscriptions.db",
        Environment::Production => "subscriptions.db",
    }
}

/// 環境に応じた.envファイルを読み込む
///
/// # 処理内容
/// 1. ENVIRONMENT に応じた.envファイルを決定
/// 2. 見つからなければデフォルトの.envにフォールバック
///
/// ログシステム初期化前に呼ばれるため、結果は戻り値のメッセージで返す。
pub fn load_environment_variables() -> Vec<String> {
    let mut messages = Vec::new();

    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

    let env_file = match environment.as_str() {
        "production" => ".env.production",
        _ => ".env",
    };

    match dotenv::from_filename(env_file) {
        Ok(_) => {
            messages.push(format!("{env_file}ファイルを読み込みました"));
        }
        Err(_) => {
            // 環境固有のファイルがない場合は、デフォルトの.envを試行
            if env_file != ".env" && dotenv::dotenv().is_ok() {
                messages.push(format!(
                    "{env_file}が見つからないため、デフォルトの.envファイルを読み込みました"
                ));
            } else {
                messages.push(
                    ".envファイルが見つかりません。直接設定された環境変数を使用します".to_string(),
                );
            }
        }
    }

    messages
}

/// ログシステムを初期化する
///
/// # 処理内容
/// 1. ログレベルを設定
/// 2. env_loggerを初期化（二重初期化は無視する）
pub fn initialize_logging_system(env_config: &EnvironmentConfig) {
    let initialized = env_logger::Builder::from_default_env()
        .filter_level(env_config.level_filter())
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .is_ok();

    if initialized {
        log::info!(
            "ログシステムを初期化しました: level={}, environment={}",
            env_config.log_level,
            env_config.environment.as_str()
        );
    }
}
