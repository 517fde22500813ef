use crate::shared::utils::Month;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// サブスクリプションデータモデル
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub service_name: String, // サービス名、100文字以内
    pub price: i64,           // 月額料金（最小通貨単位）、0以上
    pub user_id: Uuid,
    pub start_date: Month, // MM-YYYY形式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Month>, // None は継続中
    pub created_at: String,      // RFC3339形式
    pub updated_at: String,      // RFC3339形式
}

impl Subscription {
    /// 有効期間が指定期間と重なるかどうか
    ///
    /// ストアの期間条件 `start_month <= end AND (end_month IS NULL OR end_month >= start)` と同じ判定。
    pub fn intersects(&self, start: Month, end: Month) -> bool {
        self.start_date <= end && self.end_date.map_or(true, |e| e >= start)
    }
}

/// サブスクリプション作成用DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSubscriptionDto {
    pub service_name: String,
    pub price: i64,
    pub user_id: Uuid,
    pub start_date: Month,
    #[serde(default)]
    pub end_date: Option<Month>,
}

/// サブスクリプション更新用DTO
///
/// 各フィールドは省略時に変更なし。`end_date` は明示的な `null` で終了月を解除する。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSubscriptionDto {
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub start_date: Option<Month>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub end_date: Option<Option<Month>>,
}

/// 省略（None）と null（Some(None)）を区別して読み込む
fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 一覧・集計で共通の絞り込み条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// ユーザーIDの完全一致
    pub user_id: Option<Uuid>,
    /// サービス名の部分一致（大文字小文字を区別しない）
    pub service_name: Option<String>,
}

impl SubscriptionFilter {
    /// 絞り込み条件に一致するかどうか（ストアのSQL条件と同じ判定）
    pub fn matches(&self, subscription: &Subscription) -> bool {
        let user_matches = self
            .user_id
            .map_or(true, |user_id| subscription.user_id == user_id);
        let name_matches = self.service_name.as_deref().map_or(true, |name| {
            subscription
                .service_name
                .to_lowercase()
                .contains(&name.to_lowercase())
        });
        user_matches && name_matches
    }
}

/// 一覧取得の条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: SubscriptionFilter,
    pub limit: u32,
    pub offset: u32,
}

/// 一覧取得の結果
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPage {
    pub items: Vec<Subscription>,
    /// limit/offset 適用前の件数
    pub total: i64,
    pub limit: u32,
    pub offset: u32,
}

/// 期間別コスト集計の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostReport {
    pub total_cost: i64,
    pub count: i64,
    pub period: String,
}
