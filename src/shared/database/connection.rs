use crate::shared::config::StoreConfig;
use crate::shared::errors::{AppError, AppResult};
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// サブスクリプションテーブルに必要なカラム
const SUBSCRIPTION_COLUMNS: [&str; 8] = [
    "id",
    "service_name",
    "price",
    "user_id",
    "start_month",
    "end_month",
    "created_at",
    "updated_at",
];

/// データベース接続を初期化し、必要に応じてマイグレーションを実行する
///
/// # 引数
/// * `config` - ストア設定
///
/// # 戻り値
/// データベース接続、または失敗時はエラー
///
/// # 処理内容
/// 1. データベースファイルの親ディレクトリの確保
/// 2. データベース接続の開設
/// 3. テーブル作成（`run_migrations` が false の場合はスキーマ確認のみ）
pub fn initialize_database(config: &StoreConfig) -> AppResult<Connection> {
    ensure_parent_directory(&config.database_path)?;

    let conn = Connection::open(&config.database_path)?;
    configure_connection(&conn)?;

    if config.run_migrations {
        create_tables(&conn)?;
    } else {
        log::info!("自動マイグレーションは無効です。既存スキーマを確認します");
        verify_schema(&conn)?;
    }

    log::info!(
        "データベースを初期化しました: {:?}",
        config.database_path
    );

    Ok(conn)
}

/// インメモリのデータベースを初期化する（テスト・一時利用向け）
pub fn initialize_in_memory_database() -> AppResult<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_connection(&conn)?;
    create_tables(&conn)?;
    Ok(conn)
}

/// データベースファイルの親ディレクトリを作成する
fn ensure_parent_directory(database_path: &Path) -> AppResult<()> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::configuration(format!("データディレクトリの作成に失敗: {e}"))
            })?;
            log::info!("データディレクトリを作成: {:?}", parent);
        }
    }
    Ok(())
}

/// 接続単位の設定
///
/// SQLite標準の lower() はASCIIしか変換しないため、サービス名の部分一致検索用に
/// Unicode対応の fold_case() を登録する。
fn configure_connection(conn: &Connection) -> AppResult<()> {
    conn.busy_timeout(Duration::from_secs(5))?;

    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: String = ctx.get(0)?;
            Ok(value.to_lowercase())
        },
    )?;

    Ok(())
}

/// データベーステーブルを作成する
///
/// 何度実行しても同じ結果になる。
pub fn create_tables(conn: &Connection) -> AppResult<()> {
    create_subscriptions_table(conn)?;
    create_indexes(conn)?;
    Ok(())
}

/// サブスクリプションテーブルを作成する
///
/// 月は YYYY-MM 形式で保存する（文字列比較と時系列比較を一致させるため）。
fn create_subscriptions_table(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subscriptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            service_name TEXT NOT NULL,
            price INTEGER NOT NULL CHECK(price >= 0),
            user_id TEXT NOT NULL,
            start_month TEXT NOT NULL,
            end_month TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// インデックスを作成する
fn create_indexes(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id ON subscriptions(user_id)",
        [],
    )?;

    // 期間重複条件（start_month <= ? AND end_month >= ?）の絞り込み用
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_period ON subscriptions(start_month, end_month)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subscriptions_created_at ON subscriptions(created_at)",
        [],
    )?;

    Ok(())
}

/// 既存スキーマに必要なカラムが揃っているか確認する
fn verify_schema(conn: &Connection) -> AppResult<()> {
    let missing: Vec<&str> = SUBSCRIPTION_COLUMNS
        .iter()
        .copied()
        .filter(|column| !check_column_exists(conn, "subscriptions", column))
        .collect();

    if !missing.is_empty() {
        return Err(AppError::Database(format!(
            "subscriptionsテーブルのスキーマが不足しています: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

/// テーブルに指定されたカラムが存在するかチェックする
///
/// # 引数
/// * `conn` - データベース接続
/// * `table_name` - テーブル名
/// * `column_name` - カラム名
///
/// # 戻り値
/// カラムが存在する場合はtrue、存在しないかエラーの場合はfalse
fn check_column_exists(conn: &Connection, table_name: &str, column_name: &str) -> bool {
    let query = format!("PRAGMA table_info({table_name})");

    let Ok(mut stmt) = conn.prepare(&query) else {
        return false;
    };

    // 行イテレータは stmt を借用するため、戻り値にする前に評価を終える
    let exists = match stmt.query_map([], |row| row.get::<_, String>(1)) {
        Ok(rows) => rows.flatten().any(|name| name == column_name),
        Err(_) => false,
    };
    exists
}
