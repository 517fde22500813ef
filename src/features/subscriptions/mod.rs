/// サブスクリプション機能モジュール
///
/// このモジュールは、サブスクリプション管理に関連するすべての機能を提供します：
/// - サブスクリプションの作成、読み取り、更新、削除
/// - 絞り込みとページングによる一覧取得
/// - 期間別コスト集計
pub mod aggregator;
pub mod commands;
pub mod models;
pub mod repository;
pub mod store;

// 公開インターフェース
pub use aggregator::{compute_total_cost, CostPeriod};

pub use commands::{
    create_subscription, delete_subscription, get_subscription, get_total_cost,
    list_subscriptions, update_subscription,
};

pub use models::{
    CostReport, CreateSubscriptionDto, ListQuery, Subscription, SubscriptionFilter,
    SubscriptionPage, UpdateSubscriptionDto,
};

pub use store::{SqliteSubscriptionStore, SubscriptionSource};
