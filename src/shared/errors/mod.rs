use crate::shared::utils::month::MonthParseError;
use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 月の値がMM-YYYY形式として解析できない
    #[error("{field} の形式が不正です（MM-YYYY形式で指定してください）: {source}")]
    MalformedMonth {
        field: &'static str,
        #[source]
        source: MonthParseError,
    },

    /// 集計期間の開始月が終了月より後になっている
    #[error("開始月 {start} が終了月 {end} より後になっています")]
    InvertedPeriod { start: String, end: String },

    /// 合計金額がi64の範囲を超えた
    #[error("合計金額の計算でオーバーフローが発生しました")]
    CostOverflow,

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    /// 並行処理関連のエラー
    #[error("並行処理エラー: {0}")]
    Concurrency(String),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（ファイル操作など）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
}

impl AppError {
    /// ユーザーに表示するためのフレンドリーなメッセージを取得
    ///
    /// 入力に起因するエラーは詳細をそのまま返し、内部エラーは汎用メッセージに置き換える。
    pub fn user_message(&self) -> String {
        match self {
            AppError::Database(_) => "データベース操作でエラーが発生しました".to_string(),
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::MalformedMonth { .. } | AppError::InvertedPeriod { .. } => self.to_string(),
            AppError::CostOverflow => self.to_string(),
            AppError::Configuration(_) => "設定エラーが発生しました".to_string(),
            AppError::Io(_) => "ファイル操作でエラーが発生しました".to_string(),
            AppError::Json(e) => format!("リクエストの形式が不正です: {e}"),
            AppError::Concurrency(_) => "並行処理でエラーが発生しました".to_string(),
        }
    }

    /// エラーの詳細情報を取得（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Database(_) => ErrorSeverity::High,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::MalformedMonth { .. } => ErrorSeverity::Low,
            AppError::InvertedPeriod { .. } => ErrorSeverity::Low,
            AppError::CostOverflow => ErrorSeverity::Medium,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Io(_) => ErrorSeverity::Medium,
            AppError::Json(_) => ErrorSeverity::Low,
            AppError::Concurrency(_) => ErrorSeverity::High,
        }
    }

    /// 呼び出し側の入力に起因するエラーかどうか
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::NotFound(_)
                | AppError::MalformedMonth { .. }
                | AppError::InvertedPeriod { .. }
                | AppError::Json(_)
        )
    }

    /// バリデーションエラーを作成するヘルパー関数
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{}が見つかりません", resource.into()))
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// 並行処理エラーを作成するヘルパー関数
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        AppError::Concurrency(message.into())
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        AppError::Database(error.to_string())
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::utils::month::Month;

    #[test]
    fn test_error_severity() {
        assert_eq!(
            AppError::validation("テスト").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::not_found("サブスクリプション").severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            AppError::Database("接続失敗".to_string()).severity(),
            ErrorSeverity::High
        );
        assert_eq!(
            AppError::configuration("PORTが不正").severity(),
            ErrorSeverity::High
        );
    }

    #[test]
    fn test_user_message() {
        let validation_error = AppError::validation("価格が不正です");
        assert_eq!(validation_error.user_message(), "価格が不正です");

        let not_found_error = AppError::not_found("サブスクリプション");
        assert_eq!(
            not_found_error.user_message(),
            "サブスクリプションが見つかりません"
        );

        // 内部エラーの詳細はユーザーに返さない
        let db_error = AppError::Database("no such table: subscriptions".to_string());
        assert_eq!(
            db_error.user_message(),
            "データベース操作でエラーが発生しました"
        );
    }

    #[test]
    fn test_month_errors_carry_field_name() {
        let source = Month::parse("13-2025").unwrap_err();
        let error = AppError::MalformedMonth {
            field: "start_date",
            source,
        };

        assert!(error.user_message().contains("start_date"));
        assert!(error.is_client_error());

        let inverted = AppError::InvertedPeriod {
            start: "06-2025".to_string(),
            end: "01-2025".to_string(),
        };
        assert!(inverted.user_message().contains("06-2025"));
        assert!(inverted.is_client_error());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AppError::validation("x").is_client_error());
        assert!(AppError::not_found("x").is_client_error());
        assert!(!AppError::Database("x".to_string()).is_client_error());
        assert!(!AppError::CostOverflow.is_client_error());
        assert!(!AppError::concurrency("x").is_client_error());
    }

    #[test]
    fn test_rusqlite_conversion() {
        let error: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(error, AppError::Database(_)));
    }
}
