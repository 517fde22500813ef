/// 月単位の日付値
pub mod month;

use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use chrono_tz::Tz;

pub use month::{months_inclusive, Month, MonthParseError};

/// 価格の上限（10桁以内）
pub const MAX_PRICE: i64 = 9_999_999_999;

/// 価格のバリデーション
///
/// # 引数
/// * `price` - 月額料金（最小通貨単位）
///
/// # 戻り値
/// 有効な価格の場合はOk(())、無効な場合はエラー
///
/// # バリデーション規則
/// - 0以上であること（無料プランを許可）
/// - 10桁以内であること
pub fn validate_price(price: i64) -> AppResult<()> {
    if price < 0 {
        return Err(AppError::validation("価格は0以上で入力してください"));
    }

    if price > MAX_PRICE {
        return Err(AppError::validation("価格は10桁以内で入力してください"));
    }

    Ok(())
}

/// 文字列の長さバリデーション
///
/// # 引数
/// * `text` - 検証対象の文字列
/// * `max_length` - 最大文字数
/// * `field_name` - フィールド名（エラーメッセージ用）
pub fn validate_text_length(text: &str, max_length: usize, field_name: &str) -> AppResult<()> {
    let char_count = text.chars().count();
    if char_count > max_length {
        return Err(AppError::validation(format!(
            "{field_name}は{max_length}文字以内で入力してください（現在: {char_count}文字）"
        )));
    }
    Ok(())
}

/// 必須フィールドのバリデーション
///
/// 前後の空白のみの値は空とみなす。
pub fn validate_required_field(text: &str, field_name: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::validation(format!("{field_name}は必須項目です")));
    }
    Ok(())
}

/// 開始月と終了月の前後関係のバリデーション
///
/// 終了月がない（継続中）場合は常に有効。
pub fn validate_month_range(start: Month, end: Option<Month>) -> AppResult<()> {
    match end {
        Some(end) if start > end => Err(AppError::validation(format!(
            "終了月（{end}）は開始月（{start}）以降である必要があります"
        ))),
        _ => Ok(()),
    }
}

/// 指定タイムゾーンでの現在時刻（RFC3339形式）
pub fn current_timestamp(timezone: &Tz) -> String {
    Utc::now().with_timezone(timezone).to_rfc3339()
}

/// 文字列の正規化（前後の空白を削除）
pub fn normalize_string(text: &str) -> String {
    text.trim().to_string()
}

/// 空文字列をNoneとして扱う
///
/// クエリパラメータの `?user_id=` のような空指定をフィルタなしとみなすために使う。
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
