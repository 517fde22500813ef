// 月単位の日付値（MM-YYYY）
// 集計処理・バリデーション・永続化で共通して使う

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 外部表現（MM-YYYY）
static WIRE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2})-(\d{4})$").expect("MM-YYYY形式の正規表現が不正です"));

/// データベース上の表現（YYYY-MM）
static STORAGE_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("YYYY-MM形式の正規表現が不正です"));

/// 月の解析エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonthParseError {
    #[error("'{0}' はMM-YYYY形式ではありません")]
    Format(String),

    #[error("月 {0} は1から12の範囲外です")]
    MonthOutOfRange(u32),

    #[error("年 {0} は0から9999の範囲外です")]
    YearOutOfRange(i32),
}

/// 日を持たない暦月
///
/// フィールドの宣言順（年→月）がそのまま時系列順の比較になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// 年と月から値を作成する
    ///
    /// # 引数
    /// * `year` - 西暦年（0〜9999）
    /// * `month` - 月（1〜12）
    pub fn new(year: i32, month: u32) -> Result<Self, MonthParseError> {
        if !(1..=12).contains(&month) {
            return Err(MonthParseError::MonthOutOfRange(month));
        }
        if !(0..=9999).contains(&year) {
            return Err(MonthParseError::YearOutOfRange(year));
        }
        Ok(Self { year, month })
    }

    /// MM-YYYY形式の文字列を解析する
    ///
    /// 月は必ず2桁、年は必ず4桁。`1-2025` や `2025-01` は受け付けない。
    ///
    /// # 引数
    /// * `value` - 解析対象の文字列
    ///
    /// # 戻り値
    /// 解析された月、または形式・範囲エラー
    pub fn parse(value: &str) -> Result<Self, MonthParseError> {
        let captures = WIRE_FORMAT
            .captures(value)
            .ok_or_else(|| MonthParseError::Format(value.to_string()))?;

        let month = captures[1]
            .parse::<u32>()
            .map_err(|_| MonthParseError::Format(value.to_string()))?;
        let year = captures[2]
            .parse::<i32>()
            .map_err(|_| MonthParseError::Format(value.to_string()))?;

        Self::new(year, month)
    }

    /// データベース上の表現（YYYY-MM）を解析する
    pub fn from_storage_key(value: &str) -> Result<Self, MonthParseError> {
        let captures = STORAGE_FORMAT
            .captures(value)
            .ok_or_else(|| MonthParseError::Format(value.to_string()))?;

        let year = captures[1]
            .parse::<i32>()
            .map_err(|_| MonthParseError::Format(value.to_string()))?;
        let month = captures[2]
            .parse::<u32>()
            .map_err(|_| MonthParseError::Format(value.to_string()))?;

        Self::new(year, month)
    }

    /// データベース上の表現（YYYY-MM）
    ///
    /// 文字列比較が時系列比較と一致するため、SQL側の範囲条件にそのまま使える。
    pub fn storage_key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    /// 0年1月を0とした通算月数
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }
}

/// 開始月から終了月までの月数（両端を含む）
///
/// `start == end` のとき1を返す。`start > end` の場合は0以下になるため、
/// 呼び出し側で順序を確認してから使うこと。
pub fn months_inclusive(start: Month, end: Month) -> i64 {
    end.ordinal() - start.ordinal() + 1
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Month::parse(&value).map_err(de::Error::custom)
    }
}

impl ToSql for Month {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.storage_key()))
    }
}

impl FromSql for Month {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Month::from_storage_key(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
impl quickcheck::Arbitrary for Month {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let year = 2000 + (u32::arbitrary(g) % 40) as i32;
        let month = u32::arbitrary(g) % 12 + 1;
        Month { year, month }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn month(value: &str) -> Month {
        Month::parse(value).unwrap()
    }

    #[test]
    fn test_parse_valid_months() {
        let july = month("07-2025");
        assert_eq!((july.year, july.month), (2025, 7));

        assert_eq!(month("01-2025").month, 1);
        assert_eq!(month("12-1999").year, 1999);
    }

    #[test]
    fn test_parse_rejects_out_of_range_month() {
        assert_eq!(
            Month::parse("13-2025"),
            Err(MonthParseError::MonthOutOfRange(13))
        );
        assert_eq!(
            Month::parse("00-2025"),
            Err(MonthParseError::MonthOutOfRange(0))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        for input in ["", "1-2025", "2025-01", "01-25", " 01-2025", "01-2025 ", "01/2025", "ab-2025", "01-2025-01"] {
            assert!(
                matches!(Month::parse(input), Err(MonthParseError::Format(_))),
                "受け付けてはいけない入力: {input:?}"
            );
        }
    }

    #[test]
    fn test_display_uses_wire_format() {
        assert_eq!(month("07-2025").to_string(), "07-2025");
        assert_eq!(Month::new(25, 3).unwrap().to_string(), "03-0025");
    }

    #[test]
    fn test_chronological_ordering() {
        assert!(month("12-2024") < month("01-2025"));
        assert!(month("02-2025") > month("01-2025"));
        assert_eq!(month("06-2025").max(month("01-2025")), month("06-2025"));
        assert_eq!(month("06-2025").min(month("01-2025")), month("01-2025"));
    }

    #[test]
    fn test_months_inclusive() {
        assert_eq!(months_inclusive(month("07-2025"), month("12-2025")), 6);
        assert_eq!(months_inclusive(month("02-2025"), month("02-2025")), 1);
        assert_eq!(months_inclusive(month("11-2024"), month("02-2025")), 4);
        assert_eq!(months_inclusive(month("01-2025"), month("12-2025")), 12);
        // 複数年にまたがる範囲
        assert_eq!(months_inclusive(month("01-2020"), month("12-2025")), 72);
        assert_eq!(months_inclusive(month("12-2024"), month("01-2026")), 14);
    }

    #[test]
    fn test_ordinal_counts_from_year_zero() {
        assert_eq!(Month::new(0, 1).unwrap().ordinal(), 0);
        assert_eq!(Month::new(0, 12).unwrap().ordinal(), 11);
        assert_eq!(Month::new(1, 1).unwrap().ordinal(), 12);
        assert_eq!(month("01-2025").ordinal(), 2025 * 12);
        assert_eq!(month("12-2024").ordinal() + 1, month("01-2025").ordinal());
    }

    #[test]
    fn test_storage_key_round_trip() {
        let value = month("03-2025");
        assert_eq!(value.storage_key(), "2025-03");
        assert_eq!(Month::from_storage_key("2025-03").unwrap(), value);
        assert!(Month::from_storage_key("03-2025").is_err());
    }

    #[test]
    fn test_serde_uses_wire_format() {
        let value = month("09-2024");
        assert_eq!(serde_json::to_string(&value).unwrap(), "\"09-2024\"");

        let parsed: Month = serde_json::from_str("\"09-2024\"").unwrap();
        assert_eq!(parsed, value);

        assert!(serde_json::from_str::<Month>("\"2024-09\"").is_err());
    }

    #[test]
    fn test_sqlite_round_trip() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let value = month("10-2023");

        let stored: String = conn
            .query_row("SELECT ?1", [&value], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, "2023-10");

        let loaded: Month = conn
            .query_row("SELECT '2023-10'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loaded, value);
    }

    #[quickcheck]
    fn storage_key_order_matches_chronological_order(a: Month, b: Month) -> bool {
        a.cmp(&b) == a.storage_key().cmp(&b.storage_key())
    }

    #[quickcheck]
    fn months_inclusive_is_positive_for_ordered_bounds(a: Month, b: Month) -> bool {
        let (start, end) = (a.min(b), a.max(b));
        months_inclusive(start, end) >= 1
    }
}
