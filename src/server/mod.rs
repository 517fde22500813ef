/// HTTPレスポンスの組み立て
pub mod response;

/// ルーティング
pub mod router;

use crate::shared::errors::AppResult;
use crate::AppState;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use response::{error_body, HttpResponse};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// リクエストボディの上限（1 MiB）
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// HTTPサーバー
pub struct HttpServer {
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_timeout: Duration,
}

impl HttpServer {
    /// 指定アドレスで待ち受けを開始する
    ///
    /// # 引数
    /// * `addr` - 待ち受けアドレス（ポート0で空きポートを自動割り当て）
    /// * `state` - アプリケーション状態
    /// * `shutdown_timeout` - シャットダウン時に接続の終了を待つ最大時間
    pub async fn bind(
        addr: SocketAddr,
        state: Arc<AppState>,
        shutdown_timeout: Duration,
    ) -> AppResult<Self> {
        let listener = TcpListener::bind(addr).await?;

        Ok(Self {
            listener,
            state,
            shutdown_timeout,
        })
    }

    /// 実際に待ち受けているアドレス
    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// `shutdown` が完了するまで接続を受け付ける
    ///
    /// 停止後は新規接続を受け付けず、処理中の接続の終了を `shutdown_timeout` まで待つ。
    pub async fn serve<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            state,
            shutdown_timeout,
        } = self;

        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            log::error!("接続受け入れエラー: {e}");
                            continue;
                        }
                    };

                    let state = Arc::clone(&state);
                    let service = service_fn(move |req| handle_request(req, Arc::clone(&state)));
                    let connection = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
                    let connection = graceful.watch(connection);

                    tokio::spawn(async move {
                        if let Err(err) = connection.await {
                            log::debug!("HTTP接続処理エラー ({peer}): {err}");
                        }
                    });
                }
                _ = &mut shutdown => {
                    log::info!("シャットダウン要求を受信しました。新規接続の受け付けを停止します");
                    break;
                }
            }
        }

        drop(listener);

        tokio::select! {
            _ = graceful.shutdown() => {
                log::info!("すべての接続を終了しました");
            }
            _ = tokio::time::sleep(shutdown_timeout) => {
                log::warn!("接続の終了待ちがタイムアウトしました（{shutdown_timeout:?}）");
            }
        }

        Ok(())
    }
}

/// リクエストボディを上限付きで読み込む
///
/// 上限を超えた場合は413、読み込み自体に失敗した場合は400のレスポンスを返す。
async fn read_body<B>(body: B) -> Result<Bytes, HttpResponse>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, MAX_BODY_SIZE).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_body(
            StatusCode::PAYLOAD_TOO_LARGE,
            "リクエストボディが大きすぎます（上限 1 MiB）",
        )),
        Err(e) => {
            log::warn!("リクエストボディの読み込みに失敗しました: {e}");
            Err(error_body(
                StatusCode::BAD_REQUEST,
                "リクエストボディを読み込めませんでした",
            ))
        }
    }
}

/// ブロッキング処理を専用スレッドで実行する
///
/// ストア操作は同期APIのため、ワーカースレッドを塞がないよう `spawn_blocking` に逃がす。
/// 処理がパニックした場合は接続を落とさず500を返す。
async fn run_blocking<F>(work: F) -> HttpResponse
where
    F: FnOnce() -> HttpResponse + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("リクエスト処理タスクが異常終了しました: {e}");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部エラーが発生しました",
            )
        }
    }
}

/// HTTPリクエストを処理する
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<HttpResponse, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let method = parts.method;
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().map(str::to_string);

    let response = match read_body(body).await {
        Ok(body) => {
            let method = method.clone();
            let path = path.clone();
            run_blocking(move || router::dispatch(&state, &method, &path, query.as_deref(), &body))
                .await
        }
        Err(response) => response,
    };

    log::info!(
        "{method} {path} -> {} ({}ms)",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::subscriptions::SqliteSubscriptionStore;
    use crate::shared::config::PaginationConfig;
    use http_body_util::Full;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            store: SqliteSubscriptionStore::open_in_memory(chrono_tz::UTC).unwrap(),
            pagination: PaginationConfig {
                default_limit: 20,
                max_limit: 100,
            },
        })
    }

    async fn send_raw(addr: SocketAddr, request: String) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let within = Full::new(Bytes::from(vec![b'a'; MAX_BODY_SIZE]));
        assert_eq!(read_body(within).await.unwrap().len(), MAX_BODY_SIZE);

        let over = Full::new(Bytes::from(vec![b'a'; MAX_BODY_SIZE + 1]));
        let response = read_body(over).await.unwrap_err();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_run_blocking_turns_panic_into_500() {
        let ok = run_blocking(|| error_body(StatusCode::NOT_FOUND, "x")).await;
        assert_eq!(ok.status(), StatusCode::NOT_FOUND);

        let panicked = run_blocking(|| panic!("ハンドラ内のパニック")).await;
        assert_eq!(panicked.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = panicked.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "内部エラーが発生しました");
    }

    #[tokio::test]
    async fn test_serve_and_graceful_shutdown() {
        let server = HttpServer::bind(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            state(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = shutdown_rx.await;
        }));

        let health = send_raw(
            addr,
            "GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
        )
        .await;
        assert!(health.starts_with("HTTP/1.1 200 OK"), "{health}");
        assert!(health.contains(r#"{"status":"ok"}"#));

        let body = r#"{"service_name":"Yandex Plus","price":400,"user_id":"60601fee-2bf1-4721-ae6f-7636e79a0cba","start_date":"07-2025"}"#;
        let created = send_raw(
            addr,
            format!(
                "POST /api/subs HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            ),
        )
        .await;
        assert!(created.starts_with("HTTP/1.1 201 Created"), "{created}");

        let total = send_raw(
            addr,
            "GET /api/subs/total?start_date=01-2025&end_date=12-2025 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n".to_string(),
        )
        .await;
        assert!(total.contains(r#""total_cost":2400"#), "{total}");

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();

        // 停止後は接続できない
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
