use crate::shared::errors::{AppError, ErrorSeverity};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{Method, Response, StatusCode};
use serde::Serialize;

/// レスポンス型
pub type HttpResponse = Response<Full<Bytes>>;

/// シリアライズに失敗した場合に返す本文
const FALLBACK_ERROR_BODY: &str = r#"{"error":"内部エラーが発生しました"}"#;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

fn with_body(status: StatusCode, body: Bytes, content_type: Option<&'static str>) -> HttpResponse {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

/// 値をJSONとして返す
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, Bytes::from(body), Some("application/json")),
        Err(e) => {
            log::error!("レスポンスのシリアライズに失敗しました: {e}");
            with_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                Bytes::from_static(FALLBACK_ERROR_BODY.as_bytes()),
                Some("application/json"),
            )
        }
    }
}

/// 本文のないレスポンス（204など）
pub fn empty_response(status: StatusCode) -> HttpResponse {
    with_body(status, Bytes::new(), None)
}

/// `{"error": message}` 形式のエラーレスポンス
pub fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &ErrorBody { error: message })
}

/// 未対応メソッドへの405レスポンス（Allowヘッダー付き）
pub fn method_not_allowed(allowed: &[Method]) -> HttpResponse {
    let mut response = error_body(
        StatusCode::METHOD_NOT_ALLOWED,
        "このパスでは許可されていないメソッドです",
    );

    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }

    response
}

/// エラーに対応するHTTPステータス
pub fn status_for(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// AppErrorをエラーレスポンスに変換する
///
/// 内部エラーの詳細はログにのみ出力し、レスポンスには `user_message()` を載せる。
pub fn error_response(error: &AppError) -> HttpResponse {
    match error.severity() {
        ErrorSeverity::High => log::error!("{}", error.details()),
        ErrorSeverity::Medium => log::warn!("{}", error.details()),
        ErrorSeverity::Low => log::debug!("{}", error.details()),
    }

    error_body(status_for(error), &error.user_message())
}
