use super::models::{
    CreateSubscriptionDto, ListQuery, Subscription, SubscriptionFilter, SubscriptionPage,
    UpdateSubscriptionDto,
};
use super::repository;
use crate::shared::config::StoreConfig;
use crate::shared::database::{initialize_database, initialize_in_memory_database};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{current_timestamp, Month};
use chrono_tz::Tz;
use rusqlite::Connection;
use std::sync::Mutex;

/// 期間と重なるサブスクリプションの取得元
///
/// コスト集計はこのトレイトにのみ依存する。テストではメモリ上の実装に差し替える。
pub trait SubscriptionSource {
    /// `[start, end]` と有効期間が重なり、絞り込み条件に一致するサブスクリプションを返す
    fn find_intersecting(
        &self,
        start: Month,
        end: Month,
        filter: &SubscriptionFilter,
    ) -> AppResult<Vec<Subscription>>;
}

/// SQLiteに永続化するサブスクリプションストア
///
/// 接続は1本をMutexで共有する。
pub struct SqliteSubscriptionStore {
    conn: Mutex<Connection>,
    timezone: Tz,
}

impl SqliteSubscriptionStore {
    /// 設定に従ってデータベースを開く
    pub fn open(config: &StoreConfig) -> AppResult<Self> {
        let conn = initialize_database(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            timezone: config.timezone,
        })
    }

    /// インメモリのストアを作成する
    pub fn open_in_memory(timezone: Tz) -> AppResult<Self> {
        let conn = initialize_in_memory_database()?;
        Ok(Self {
            conn: Mutex::new(conn),
            timezone,
        })
    }

    fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> AppResult<T>) -> AppResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))?;
        f(&conn)
    }

    pub fn create(&self, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
        let now = current_timestamp(&self.timezone);
        self.with_connection(|conn| repository::create(conn, dto, &now))
    }

    pub fn find_by_id(&self, id: i64) -> AppResult<Subscription> {
        self.with_connection(|conn| repository::find_by_id(conn, id))
    }

    pub fn update(&self, id: i64, dto: UpdateSubscriptionDto) -> AppResult<Subscription> {
        let now = current_timestamp(&self.timezone);
        self.with_connection(|conn| repository::update(conn, id, dto, &now))
    }

    pub fn delete(&self, id: i64) -> AppResult<()> {
        self.with_connection(|conn| repository::delete(conn, id))
    }

    pub fn list(&self, query: &ListQuery) -> AppResult<SubscriptionPage> {
        self.with_connection(|conn| repository::find_page(conn, query))
    }
}

impl SubscriptionSource for SqliteSubscriptionStore {
    fn find_intersecting(
        &self,
        start: Month,
        end: Month,
        filter: &SubscriptionFilter,
    ) -> AppResult<Vec<Subscription>> {
        self.with_connection(|conn| repository::find_intersecting(conn, start, end, filter))
    }
}
