use super::response::{
    empty_response, error_body, error_response, json_response, method_not_allowed, HttpResponse,
};
use crate::features::subscriptions::{
    self, CreateSubscriptionDto, SubscriptionFilter, UpdateSubscriptionDto,
};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::non_empty;
use crate::AppState;
use hyper::{Method, StatusCode};
use std::collections::HashMap;
use uuid::Uuid;

/// ルート定義
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    Health,
    Subscriptions,
    SubscriptionList,
    TotalCost,
    Subscription(&'a str),
}

impl Route<'_> {
    /// パスからルートを判定する
    fn from_path(path: &str) -> Option<Route<'_>> {
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };

        match path {
            "/health" => Some(Route::Health),
            "/api/subs" => Some(Route::Subscriptions),
            "/api/subs/list" => Some(Route::SubscriptionList),
            "/api/subs/total" => Some(Route::TotalCost),
            _ => path
                .strip_prefix("/api/subs/")
                .filter(|id| !id.contains('/'))
                .map(Route::Subscription),
        }
    }

    fn allowed_methods(&self) -> Vec<Method> {
        match self {
            Route::Health | Route::SubscriptionList | Route::TotalCost => vec![Method::GET],
            Route::Subscriptions => vec![Method::POST],
            Route::Subscription(_) => vec![Method::GET, Method::PUT, Method::DELETE],
        }
    }
}

/// クエリ文字列のパラメータ
///
/// 同じキーが複数ある場合は最後の値を使う。空の値は指定なしとみなす。
struct QueryParams(HashMap<String, String>);

impl QueryParams {
    fn parse(query: Option<&str>) -> Self {
        let params = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect::<HashMap<_, _>>()
            })
            .unwrap_or_default();
        Self(params)
    }

    fn get(&self, key: &str) -> Option<&str> {
        non_empty(self.0.get(key).map(String::as_str))
    }

    fn get_u32(&self, key: &str) -> AppResult<Option<u32>> {
        self.get(key)
            .map(|value| {
                value.parse::<u32>().map_err(|_| {
                    AppError::validation(format!("{key}は0以上の整数で指定してください"))
                })
            })
            .transpose()
    }

    fn filter(&self) -> AppResult<SubscriptionFilter> {
        let user_id = self
            .get("user_id")
            .map(|value| {
                Uuid::parse_str(value)
                    .map_err(|_| AppError::validation("user_idはUUID形式で指定してください"))
            })
            .transpose()?;

        Ok(SubscriptionFilter {
            user_id,
            service_name: self.get("service_name").map(str::to_string),
        })
    }
}

fn parse_id(raw: &str) -> AppResult<i64> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::validation(format!(
            "IDは正の整数で指定してください: {raw}"
        ))),
    }
}

/// リクエストを各処理に振り分ける
///
/// ストアへのアクセスを伴うため、非同期タスクからは `spawn_blocking` 経由で呼び出す。
///
/// # 引数
/// * `state` - アプリケーション状態
/// * `method` - HTTPメソッド
/// * `path` - リクエストパス
/// * `query` - クエリ文字列
/// * `body` - リクエストボディ
pub fn dispatch(
    state: &AppState,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> HttpResponse {
    let Some(route) = Route::from_path(path) else {
        return error_body(StatusCode::NOT_FOUND, "指定されたパスは存在しません");
    };

    let allowed = route.allowed_methods();
    if !allowed.contains(method) {
        return method_not_allowed(&allowed);
    }

    match handle(state, route, method, query, body) {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

fn handle(
    state: &AppState,
    route: Route<'_>,
    method: &Method,
    query: Option<&str>,
    body: &[u8],
) -> AppResult<HttpResponse> {
    match (route, method) {
        (Route::Health, _) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "ok" }),
        )),
        (Route::Subscriptions, _) => {
            let dto: CreateSubscriptionDto = serde_json::from_slice(body)?;
            let subscription = subscriptions::create_subscription(state, dto)?;
            Ok(json_response(StatusCode::CREATED, &subscription))
        }
        (Route::SubscriptionList, _) => {
            let params = QueryParams::parse(query);
            let page = subscriptions::list_subscriptions(
                state,
                params.filter()?,
                params.get_u32("limit")?,
                params.get_u32("offset")?,
            )?;
            Ok(json_response(StatusCode::OK, &page))
        }
        (Route::TotalCost, _) => {
            let params = QueryParams::parse(query);
            let (Some(start_date), Some(end_date)) =
                (params.get("start_date"), params.get("end_date"))
            else {
                return Err(AppError::validation("start_date と end_date は必須です"));
            };
            let report =
                subscriptions::get_total_cost(state, start_date, end_date, &params.filter()?)?;
            Ok(json_response(StatusCode::OK, &report))
        }
        (Route::Subscription(raw_id), &Method::GET) => {
            let subscription = subscriptions::get_subscription(state, parse_id(raw_id)?)?;
            Ok(json_response(StatusCode::OK, &subscription))
        }
        (Route::Subscription(raw_id), &Method::PUT) => {
            let id = parse_id(raw_id)?;
            let dto: UpdateSubscriptionDto = serde_json::from_slice(body)?;
            let subscription = subscriptions::update_subscription(state, id, dto)?;
            Ok(json_response(StatusCode::OK, &subscription))
        }
        (Route::Subscription(raw_id), _) => {
            subscriptions::delete_subscription(state, parse_id(raw_id)?)?;
            Ok(empty_response(StatusCode::NO_CONTENT))
        }
    }
}
