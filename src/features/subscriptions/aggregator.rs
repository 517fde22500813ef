// 期間別コスト集計
//
// 各サブスクリプションの有効期間と集計期間の重なり月数 × 月額 を合計する。

use super::models::{CostReport, Subscription, SubscriptionFilter};
use super::store::SubscriptionSource;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::{months_inclusive, Month};

/// 集計期間（両端の月を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostPeriod {
    start: Month,
    end: Month,
}

impl CostPeriod {
    /// 開始月と終了月から期間を作成する
    ///
    /// 開始月が終了月より後の場合は `InvertedPeriod`。
    pub fn new(start: Month, end: Month) -> AppResult<Self> {
        if start > end {
            return Err(AppError::InvertedPeriod {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// MM-YYYY形式の文字列から期間を作成する
    ///
    /// # 引数
    /// * `start_date` - 開始月（MM-YYYY）
    /// * `end_date` - 終了月（MM-YYYY）
    pub fn parse(start_date: &str, end_date: &str) -> AppResult<Self> {
        let start = Month::parse(start_date).map_err(|source| AppError::MalformedMonth {
            field: "start_date",
            source,
        })?;
        let end = Month::parse(end_date).map_err(|source| AppError::MalformedMonth {
            field: "end_date",
            source,
        })?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Month {
        self.start
    }

    pub fn end(&self) -> Month {
        self.end
    }

    /// 集計結果に載せる期間表記（"01-2025 to 12-2025"）
    pub fn label(&self) -> String {
        format!("{} to {}", self.start, self.end)
    }

    /// サブスクリプションの有効期間と重なる月数
    ///
    /// 終了月のない継続中のサブスクリプションは、ここで初めて期間の終了月で打ち切る。
    /// 重なりがない場合は0。
    pub fn overlap_months(&self, subscription: &Subscription) -> i64 {
        let effective_end = subscription.end_date.unwrap_or(self.end);
        let overlap_start = subscription.start_date.max(self.start);
        let overlap_end = effective_end.min(self.end);

        if overlap_start > overlap_end {
            return 0;
        }
        months_inclusive(overlap_start, overlap_end)
    }
}

/// 指定期間のコスト合計を計算する
///
/// 期間と重なるサブスクリプションを取得元から一度だけ取得し、重なり月数 × 月額 を合計する。
/// `count` は取得したサブスクリプションの件数で、寄与が0のものも含む。
///
/// # 引数
/// * `source` - サブスクリプションの取得元
/// * `start_date` - 開始月（MM-YYYY）
/// * `end_date` - 終了月（MM-YYYY）
/// * `filter` - ユーザーID・サービス名の絞り込み条件
///
/// # 戻り値
/// 集計結果、または期間の解析エラー・取得元のエラー・オーバーフロー
pub fn compute_total_cost<S>(
    source: &S,
    start_date: &str,
    end_date: &str,
    filter: &SubscriptionFilter,
) -> AppResult<CostReport>
where
    S: SubscriptionSource + ?Sized,
{
    let period = CostPeriod::parse(start_date, end_date)?;
    let subscriptions = source.find_intersecting(period.start(), period.end(), filter)?;

    let total_cost = subscriptions
        .iter()
        .try_fold(0i64, |total, subscription| {
            period
                .overlap_months(subscription)
                .checked_mul(subscription.price)
                .and_then(|cost| total.checked_add(cost))
        })
        .ok_or(AppError::CostOverflow)?;

    let count = i64::try_from(subscriptions.len()).map_err(|_| AppError::CostOverflow)?;

    log::debug!(
        "コスト集計: period={}, count={count}, total_cost={total_cost}",
        period.label()
    );

    Ok(CostReport {
        total_cost,
        count,
        period: period.label(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::cell::Cell;
    use uuid::Uuid;

    const TIMESTAMP: &str = "2025-01-12T10:00:00+00:00";

    fn month(value: &str) -> Month {
        Month::parse(value).unwrap()
    }

    fn subscription(id: i64, name: &str, price: i64, start: &str, end: Option<&str>) -> Subscription {
        Subscription {
            id,
            service_name: name.to_string(),
            price,
            user_id: Uuid::nil(),
            start_date: month(start),
            end_date: end.map(month),
            created_at: TIMESTAMP.to_string(),
            updated_at: TIMESTAMP.to_string(),
        }
    }

    /// ストアと同じ条件で絞り込むメモリ上の取得元
    struct InMemorySource {
        subscriptions: Vec<Subscription>,
        calls: Cell<usize>,
    }

    impl InMemorySource {
        fn new(subscriptions: Vec<Subscription>) -> Self {
            Self {
                subscriptions,
                calls: Cell::new(0),
            }
        }
    }

    impl SubscriptionSource for InMemorySource {
        fn find_intersecting(
            &self,
            start: Month,
            end: Month,
            filter: &SubscriptionFilter,
        ) -> AppResult<Vec<Subscription>> {
            self.calls.set(self.calls.get() + 1);
            Ok(self
                .subscriptions
                .iter()
                .filter(|s| s.intersects(start, end) && filter.matches(s))
                .cloned()
                .collect())
        }
    }

    /// 条件を無視してすべて返す取得元（取得後にレコードが変わった状況を再現する）
    struct StaleSource(Vec<Subscription>);

    impl SubscriptionSource for StaleSource {
        fn find_intersecting(
            &self,
            _start: Month,
            _end: Month,
            _filter: &SubscriptionFilter,
        ) -> AppResult<Vec<Subscription>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl SubscriptionSource for FailingSource {
        fn find_intersecting(
            &self,
            _start: Month,
            _end: Month,
            _filter: &SubscriptionFilter,
        ) -> AppResult<Vec<Subscription>> {
            Err(AppError::Database("database is locked".to_string()))
        }
    }

    fn no_filter() -> SubscriptionFilter {
        SubscriptionFilter::default()
    }

    #[test]
    fn test_open_ended_subscription_is_cut_at_period_end() {
        let source = InMemorySource::new(vec![subscription(1, "Yandex Plus", 400, "07-2025", None)]);

        let report = compute_total_cost(&source, "01-2025", "12-2025", &no_filter()).unwrap();

        assert_eq!(report.total_cost, 2400);
        assert_eq!(report.count, 1);
        assert_eq!(report.period, "01-2025 to 12-2025");
    }

    #[test]
    fn test_single_month_period() {
        let source = InMemorySource::new(vec![subscription(1, "Netflix", 100, "01-2025", Some("03-2025"))]);

        let report = compute_total_cost(&source, "02-2025", "02-2025", &no_filter()).unwrap();

        assert_eq!(report.total_cost, 100);
        assert_eq!(report.count, 1);
    }

    #[test]
    fn test_subscription_outside_period_is_not_counted() {
        let source = InMemorySource::new(vec![subscription(1, "Old", 500, "01-2023", Some("01-2024"))]);

        let report = compute_total_cost(&source, "01-2025", "06-2025", &no_filter()).unwrap();

        assert_eq!(report.total_cost, 0);
        assert_eq!(report.count, 0);
    }

    #[test]
    fn test_two_subscriptions_end_to_end() {
        let source = InMemorySource::new(vec![
            subscription(1, "X", 300, "01-2025", None),
            subscription(2, "Y", 150, "06-2025", Some("08-2025")),
        ]);

        let report = compute_total_cost(&source, "01-2025", "08-2025", &no_filter()).unwrap();

        assert_eq!(report.total_cost, 2850);
        assert_eq!(report.count, 2);
        assert_eq!(report.period, "01-2025 to 08-2025");
    }

    #[test]
    fn test_period_across_year_boundary() {
        let source = InMemorySource::new(vec![subscription(1, "Winter", 10, "11-2024", Some("02-2025"))]);

        let report = compute_total_cost(&source, "12-2024", "03-2025", &no_filter()).unwrap();

        // 12月〜2月の3か月
        assert_eq!(report.total_cost, 30);
    }

    #[test]
    fn test_filter_is_passed_to_source() {
        let alice = Uuid::new_v4();
        let mut owned = subscription(1, "Yandex Plus", 400, "01-2025", None);
        owned.user_id = alice;
        let source = InMemorySource::new(vec![owned, subscription(2, "Yandex Plus", 400, "01-2025", None)]);

        let filter = SubscriptionFilter {
            user_id: Some(alice),
            service_name: Some("yandex".to_string()),
        };
        let report = compute_total_cost(&source, "01-2025", "01-2025", &filter).unwrap();

        assert_eq!(report.total_cost, 400);
        assert_eq!(report.count, 1);
    }

    #[test]
    fn test_malformed_month() {
        let source = InMemorySource::new(vec![]);

        let result = compute_total_cost(&source, "13-2025", "12-2025", &no_filter());
        assert!(matches!(
            result,
            Err(AppError::MalformedMonth {
                field: "start_date",
                ..
            })
        ));

        let result = compute_total_cost(&source, "01-2025", "2025-12", &no_filter());
        assert!(matches!(
            result,
            Err(AppError::MalformedMonth { field: "end_date", .. })
        ));

        // 期間の解析に失敗した場合は取得元を呼ばない
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn test_inverted_period() {
        let source = InMemorySource::new(vec![]);

        let result = compute_total_cost(&source, "06-2025", "01-2025", &no_filter());
        assert!(matches!(result, Err(AppError::InvertedPeriod { .. })));
        assert_eq!(source.calls.get(), 0);
    }

    #[test]
    fn test_source_error_propagates() {
        let result = compute_total_cost(&FailingSource, "01-2025", "12-2025", &no_filter());
        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[test]
    fn test_non_overlapping_record_contributes_zero_but_is_counted() {
        let source = StaleSource(vec![
            subscription(1, "Moved", 1000, "09-2025", None),
            subscription(2, "Current", 100, "01-2025", None),
        ]);

        let report = compute_total_cost(&source, "01-2025", "03-2025", &no_filter()).unwrap();

        assert_eq!(report.total_cost, 300);
        assert_eq!(report.count, 2);
    }

    #[test]
    fn test_overflow_is_reported() {
        let source = StaleSource(vec![
            subscription(1, "A", i64::MAX / 2, "01-2025", None),
            subscription(2, "B", i64::MAX / 2, "01-2025", None),
        ]);

        let result = compute_total_cost(&source, "01-2025", "02-2025", &no_filter());
        assert!(matches!(result, Err(AppError::CostOverflow)));
    }

    #[test]
    fn test_idempotent() {
        let source = InMemorySource::new(vec![
            subscription(1, "X", 300, "01-2025", None),
            subscription(2, "Y", 150, "06-2025", Some("08-2025")),
        ]);

        let first = compute_total_cost(&source, "03-2025", "07-2025", &no_filter()).unwrap();
        let second = compute_total_cost(&source, "03-2025", "07-2025", &no_filter()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_overlap_boundary_is_one_month() {
        let period = CostPeriod::parse("05-2025", "09-2025").unwrap();

        // 期間の最終月に開始
        assert_eq!(period.overlap_months(&subscription(1, "A", 1, "09-2025", None)), 1);
        // 期間の最初の月に終了
        assert_eq!(period.overlap_months(&subscription(2, "B", 1, "01-2025", Some("05-2025"))), 1);
    }

    #[test]
    fn test_label() {
        let period = CostPeriod::new(month("01-2025"), month("12-2025")).unwrap();
        assert_eq!(period.label(), "01-2025 to 12-2025");
    }

    /// 1か月ずつ数えて求めた重なり月数
    fn brute_force_overlap(period: &CostPeriod, subscription: &Subscription) -> i64 {
        let sub_end = subscription.end_date.unwrap_or(period.end());
        (period.start().ordinal()..=period.end().ordinal())
            .filter(|m| *m >= subscription.start_date.ordinal() && *m <= sub_end.ordinal())
            .count() as i64
    }

    fn ordered(a: Month, b: Month) -> (Month, Month) {
        (a.min(b), a.max(b))
    }

    #[quickcheck]
    fn overlap_matches_month_by_month_count(a: Month, b: Month, c: Month, d: Month, open: bool) -> bool {
        let (query_start, query_end) = ordered(a, b);
        let (sub_start, sub_end) = ordered(c, d);
        let period = CostPeriod::new(query_start, query_end).unwrap();
        let sub = Subscription {
            start_date: sub_start,
            end_date: if open { None } else { Some(sub_end) },
            ..subscription(1, "Q", 1, "01-2025", None)
        };

        period.overlap_months(&sub) == brute_force_overlap(&period, &sub)
    }

    #[quickcheck]
    fn overlap_is_symmetric(a: Month, b: Month, c: Month, d: Month) -> bool {
        let (first_start, first_end) = ordered(a, b);
        let (second_start, second_end) = ordered(c, d);

        let as_period = CostPeriod::new(first_start, first_end).unwrap();
        let as_subscription = Subscription {
            start_date: second_start,
            end_date: Some(second_end),
            ..subscription(1, "Q", 1, "01-2025", None)
        };

        let swapped_period = CostPeriod::new(second_start, second_end).unwrap();
        let swapped_subscription = Subscription {
            start_date: first_start,
            end_date: Some(first_end),
            ..subscription(1, "Q", 1, "01-2025", None)
        };

        as_period.overlap_months(&as_subscription)
            == swapped_period.overlap_months(&swapped_subscription)
    }

    #[quickcheck]
    fn total_is_non_negative_and_bounded(a: Month, b: Month, prices: Vec<(u16, Month, Option<Month>)>) -> bool {
        let (start, end) = ordered(a, b);
        let subscriptions: Vec<Subscription> = prices
            .iter()
            .enumerate()
            .map(|(i, (price, s, e))| Subscription {
                price: i64::from(*price),
                start_date: *s,
                end_date: e.map(|e| e.max(*s)),
                ..subscription(i as i64, "Q", 1, "01-2025", None)
            })
            .collect();
        let upper_bound: i64 = subscriptions
            .iter()
            .filter(|s| s.intersects(start, end))
            .map(|s| s.price * months_inclusive(start, end))
            .sum();

        let source = InMemorySource::new(subscriptions);
        let report = compute_total_cost(&source, &start.to_string(), &end.to_string(), &no_filter()).unwrap();

        report.total_cost >= 0 && report.total_cost <= upper_bound
    }
}
