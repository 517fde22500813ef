pub mod features;
pub mod server;
pub mod shared;

use features::subscriptions::SqliteSubscriptionStore;
use log::{error, info};
use server::HttpServer;
use shared::config::{
    initialize_logging_system, load_environment_variables, AppConfig, EnvironmentConfig,
    PaginationConfig,
};
use shared::errors::AppResult;
use std::sync::Arc;

/// アプリケーション状態（ストアとページング設定を保持）
pub struct AppState {
    pub store: SqliteSubscriptionStore,
    pub pagination: PaginationConfig,
}

/// アプリケーションを起動し、Ctrl-Cを受け取るまでHTTPリクエストを処理する
///
/// # 処理内容
/// 1. 環境変数の読み込み（.envファイルがある場合）
/// 2. ログシステムの初期化
/// 3. 設定の構築とデータベースの初期化
/// 4. HTTPサーバーの起動と停止待ち
pub async fn run() -> AppResult<()> {
    // ログ初期化前に読み込むため、結果は後でまとめて出力する
    let env_messages = load_environment_variables();

    let env_config = EnvironmentConfig::from_env();
    initialize_logging_system(&env_config);

    for message in env_messages {
        info!("{message}");
    }

    info!("アプリケーション初期化を開始します...");

    let config = AppConfig::from_env(env_config.environment).map_err(|e| {
        error!("設定の読み込みに失敗しました: {e}");
        e
    })?;

    info!("データベースを初期化しています...");
    let store = SqliteSubscriptionStore::open(&config.store).map_err(|e| {
        error!("データベースの初期化に失敗しました: {e}");
        e
    })?;
    info!("データベースの初期化が完了しました");

    let state = Arc::new(AppState {
        store,
        pagination: config.pagination,
    });

    let server = HttpServer::bind(config.socket_addr(), state, config.shutdown_timeout).await?;
    info!(
        "サーバーを起動しました: http://{} (環境: {})",
        server.local_addr()?,
        config.environment.as_str()
    );

    server.serve(shutdown_signal()).await?;

    info!("アプリケーションを終了しました");
    Ok(())
}

/// Ctrl-Cを待つ
///
/// シグナルハンドラを登録できなかった場合は停止要求を出さない。
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("シグナルハンドラの登録に失敗しました: {e}");
        std::future::pending::<()>().await;
    }
}
