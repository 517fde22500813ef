use super::models::{
    CreateSubscriptionDto, ListQuery, Subscription, SubscriptionFilter, SubscriptionPage,
    UpdateSubscriptionDto,
};
use crate::shared::errors::AppError;
use crate::shared::utils::{normalize_string, validate_month_range, Month};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, ToSql};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, service_name, price, user_id, start_month, end_month, created_at, updated_at
     FROM subscriptions";

/// 行をサブスクリプションに変換する
fn map_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let user_id: String = row.get(3)?;
    let user_id = Uuid::parse_str(&user_id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Subscription {
        id: row.get(0)?,
        service_name: row.get(1)?,
        price: row.get(2)?,
        user_id,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn not_found(id: i64) -> AppError {
    AppError::not_found(format!("ID {id} のサブスクリプション"))
}

/// 絞り込み条件をWHERE句とパラメータに展開する
///
/// 生成するSQL断片は `AND ...` の形で、`WHERE 1=1` の後ろに連結する前提。
fn push_filter(filter: &SubscriptionFilter, sql: &mut String, params: &mut Vec<Box<dyn ToSql>>) {
    if let Some(user_id) = filter.user_id {
        sql.push_str(" AND user_id = ?");
        params.push(Box::new(user_id.to_string()));
    }

    if let Some(name) = filter.service_name.as_deref() {
        sql.push_str(" AND instr(fold_case(service_name), ?) > 0");
        params.push(Box::new(name.to_lowercase()));
    }
}

/// サブスクリプションを作成する
///
/// # 引数
/// * `conn` - データベース接続
/// * `dto` - サブスクリプション作成用DTO
/// * `now` - 作成日時（RFC3339形式）
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create(
    conn: &Connection,
    dto: CreateSubscriptionDto,
    now: &str,
) -> Result<Subscription, AppError> {
    validate_month_range(dto.start_date, dto.end_date)?;

    let service_name = normalize_string(&dto.service_name);

    conn.execute(
        "INSERT INTO subscriptions (service_name, price, user_id, start_month, end_month, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            service_name,
            dto.price,
            dto.user_id.to_string(),
            dto.start_date,
            dto.end_date,
            now,
            now
        ],
    )?;

    let id = conn.last_insert_rowid();
    find_by_id(conn, id)
}

/// IDでサブスクリプションを取得する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// サブスクリプション、または失敗時はエラー
pub fn find_by_id(conn: &Connection, id: i64) -> Result<Subscription, AppError> {
    conn.query_row(
        &format!("{SELECT_COLUMNS} WHERE id = ?1"),
        params![id],
        map_subscription,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => not_found(id),
        _ => AppError::Database(e.to_string()),
    })
}

/// サブスクリプション一覧をページ単位で取得する
///
/// 新しく登録されたものから順に返す。`total` は limit/offset 適用前の件数。
///
/// # 引数
/// * `conn` - データベース接続
/// * `query` - 絞り込み条件とページ指定
pub fn find_page(conn: &Connection, query: &ListQuery) -> Result<SubscriptionPage, AppError> {
    let mut where_clause = String::from(" WHERE 1=1");
    let mut filter_params: Vec<Box<dyn ToSql>> = Vec::new();
    push_filter(&query.filter, &mut where_clause, &mut filter_params);

    let total: i64 = {
        let sql = format!("SELECT COUNT(*) FROM subscriptions{where_clause}");
        let param_refs: Vec<&dyn ToSql> = filter_params.iter().map(|p| p.as_ref()).collect();
        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?
    };

    let sql = format!("{SELECT_COLUMNS}{where_clause} ORDER BY id DESC LIMIT ? OFFSET ?");
    let limit = i64::from(query.limit);
    let offset = i64::from(query.offset);
    let mut param_refs: Vec<&dyn ToSql> = filter_params.iter().map(|p| p.as_ref()).collect();
    param_refs.push(&limit);
    param_refs.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(param_refs.as_slice(), map_subscription)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(SubscriptionPage {
        items,
        total,
        limit: query.limit,
        offset: query.offset,
    })
}

/// 指定期間と有効期間が重なるサブスクリプションを取得する
///
/// 月は YYYY-MM 形式で保存しているため、文字列比較がそのまま時系列比較になる。
///
/// # 引数
/// * `conn` - データベース接続
/// * `start` - 期間の開始月
/// * `end` - 期間の終了月
/// * `filter` - 絞り込み条件
pub fn find_intersecting(
    conn: &Connection,
    start: Month,
    end: Month,
    filter: &SubscriptionFilter,
) -> Result<Vec<Subscription>, AppError> {
    let mut sql = format!(
        "{SELECT_COLUMNS} WHERE start_month <= ? AND (end_month IS NULL OR end_month >= ?)"
    );
    let mut query_params: Vec<Box<dyn ToSql>> = vec![Box::new(end) as Box<dyn ToSql>, Box::new(start)];
    push_filter(filter, &mut sql, &mut query_params);
    sql.push_str(" ORDER BY id");

    let param_refs: Vec<&dyn ToSql> = query_params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let subscriptions = stmt.query_map(param_refs.as_slice(), map_subscription)?;

    subscriptions
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(e.to_string()))
}

/// サブスクリプションを更新する
///
/// 省略されたフィールドは既存の値を引き継ぐ。マージ後の開始月・終了月で前後関係を再確認する。
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
/// * `now` - 更新日時（RFC3339形式）
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
pub fn update(
    conn: &Connection,
    id: i64,
    dto: UpdateSubscriptionDto,
    now: &str,
) -> Result<Subscription, AppError> {
    // 既存のサブスクリプションを取得
    let existing = find_by_id(conn, id)?;

    // 更新するフィールドを決定
    let service_name = dto
        .service_name
        .map(|name| normalize_string(&name))
        .unwrap_or(existing.service_name);
    let price = dto.price.unwrap_or(existing.price);
    let start_date = dto.start_date.unwrap_or(existing.start_date);
    let end_date = dto.end_date.unwrap_or(existing.end_date);

    validate_month_range(start_date, end_date)?;

    let rows_affected = conn.execute(
        "UPDATE subscriptions
         SET service_name = ?1, price = ?2, start_month = ?3, end_month = ?4, updated_at = ?5
         WHERE id = ?6",
        params![service_name, price, start_date, end_date, now, id],
    )?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    find_by_id(conn, id)
}

/// サブスクリプションを削除する
///
/// # 引数
/// * `conn` - データベース接続
/// * `id` - サブスクリプションID
///
/// # 戻り値
/// 成功時はOk(())、失敗時はエラー
pub fn delete(conn: &Connection, id: i64) -> Result<(), AppError> {
    let rows_affected = conn.execute("DELETE FROM subscriptions WHERE id = ?1", params![id])?;

    if rows_affected == 0 {
        return Err(not_found(id));
    }

    Ok(())
}
