use super::aggregator;
use super::models::{
    CostReport, CreateSubscriptionDto, ListQuery, Subscription, SubscriptionFilter,
    SubscriptionPage, UpdateSubscriptionDto,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{
    validate_month_range, validate_price, validate_required_field, validate_text_length,
};
use crate::AppState;

/// サービス名の最大文字数
const MAX_SERVICE_NAME_LENGTH: usize = 100;

/// サブスクリプションを作成する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// 作成されたサブスクリプション、または失敗時はエラー
pub fn create_subscription(state: &AppState, dto: CreateSubscriptionDto) -> AppResult<Subscription> {
    // バリデーション
    validate_create_subscription_dto(&dto)?;

    let subscription = state.store.create(dto)?;
    log::info!(
        "サブスクリプションを作成しました: id={}, service_name={}",
        subscription.id,
        subscription.service_name
    );

    Ok(subscription)
}

/// IDでサブスクリプションを取得する
pub fn get_subscription(state: &AppState, id: i64) -> AppResult<Subscription> {
    state.store.find_by_id(id)
}

/// サブスクリプション一覧を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `filter` - 絞り込み条件
/// * `limit` - 取得件数（省略時は既定値、上限を超える値は上限に丸める）
/// * `offset` - 読み飛ばす件数（省略時は0）
pub fn list_subscriptions(
    state: &AppState,
    filter: SubscriptionFilter,
    limit: Option<u32>,
    offset: Option<u32>,
) -> AppResult<SubscriptionPage> {
    let limit = match limit {
        Some(0) => return Err(AppError::validation("limitは1以上で指定してください")),
        Some(limit) => limit.min(state.pagination.max_limit),
        None => state.pagination.default_limit,
    };

    state.store.list(&ListQuery {
        filter,
        limit,
        offset: offset.unwrap_or(0),
    })
}

/// サブスクリプションを更新する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `id` - サブスクリプションID
/// * `dto` - サブスクリプション更新用DTO
///
/// # 戻り値
/// 更新されたサブスクリプション、または失敗時はエラー
pub fn update_subscription(
    state: &AppState,
    id: i64,
    dto: UpdateSubscriptionDto,
) -> AppResult<Subscription> {
    // バリデーション
    validate_update_subscription_dto(&dto)?;

    let subscription = state.store.update(id, dto)?;
    log::info!("サブスクリプションを更新しました: id={id}");

    Ok(subscription)
}

/// サブスクリプションを削除する
pub fn delete_subscription(state: &AppState, id: i64) -> AppResult<()> {
    state.store.delete(id)?;
    log::info!("サブスクリプションを削除しました: id={id}");
    Ok(())
}

/// 指定期間のコスト合計を取得する
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `start_date` - 開始月（MM-YYYY）
/// * `end_date` - 終了月（MM-YYYY）
/// * `filter` - ユーザーID・サービス名の絞り込み条件
pub fn get_total_cost(
    state: &AppState,
    start_date: &str,
    end_date: &str,
    filter: &SubscriptionFilter,
) -> AppResult<CostReport> {
    aggregator::compute_total_cost(&state.store, start_date, end_date, filter)
}

/// サブスクリプション作成DTOのバリデーション
///
/// # 引数
/// * `dto` - サブスクリプション作成用DTO
///
/// # 戻り値
/// バリデーション成功時はOk(())、失敗時はエラー
fn validate_create_subscription_dto(dto: &CreateSubscriptionDto) -> AppResult<()> {
    // バリデーション: サービス名は必須かつ100文字以内
    validate_required_field(&dto.service_name, "サービス名")?;
    validate_text_length(dto.service_name.trim(), MAX_SERVICE_NAME_LENGTH, "サービス名")?;

    // バリデーション: 価格は0以上10桁以内
    validate_price(dto.price)?;

    // バリデーション: 終了月は開始月以降
    validate_month_range(dto.start_date, dto.end_date)?;

    Ok(())
}

/// サブスクリプション更新DTOのバリデーション
///
/// 開始月・終了月の前後関係は既存の値とマージした後にストア側で確認する。
fn validate_update_subscription_dto(dto: &UpdateSubscriptionDto) -> AppResult<()> {
    // バリデーション: サービス名が指定されている場合は必須かつ100文字以内
    if let Some(ref name) = dto.service_name {
        validate_required_field(name, "サービス名")?;
        validate_text_length(name.trim(), MAX_SERVICE_NAME_LENGTH, "サービス名")?;
    }

    // バリデーション: 価格が指定されている場合は0以上10桁以内
    if let Some(price) = dto.price {
        validate_price(price)?;
    }

    // バリデーション: 両方指定されている場合はこの時点で前後関係を確認
    if let (Some(start), Some(Some(end))) = (dto.start_date, dto.end_date) {
        validate_month_range(start, Some(end))?;
    }

    Ok(())
}
