use std::{
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use anyhow::{Context, Result};
use blockfill::rpc::{parse_quantity, raw_block_from_value, to_quantity};
use blockfill::RawBlock;
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Seconds between mock blocks.
const BLOCK_TIME_SECS: u64 = 12;
const GENESIS_TIMESTAMP_SECS: u64 = 1_600_000_000;

/// Deterministic chain served by [`MockRpcServer`].
#[derive(Clone)]
pub struct MockChain {
    length: u64,
    failing_requests: Arc<AtomicUsize>,
    requested_blocks: Arc<AtomicU64>,
    last_authorization: Arc<Mutex<Option<String>>>,
}

impl MockChain {
    pub fn new(length: u64) -> Self {
        Self {
            length,
            failing_requests: Arc::new(AtomicUsize::new(0)),
            requested_blocks: Arc::new(AtomicU64::new(0)),
            last_authorization: Arc::new(Mutex::new(None)),
        }
    }

    pub fn timestamp_ms(&self, number: u64) -> u64 {
        (GENESIS_TIMESTAMP_SECS + number * BLOCK_TIME_SECS) * 1_000
    }

    pub fn block(&self, number: u64) -> Option<Value> {
        if number >= self.length {
            return None;
        }
        Some(json!({
            "number": to_quantity(number),
            "hash": format!("0x{:064x}", number + 1),
            "parentHash": format!("0x{:064x}", number),
            "timestamp": to_quantity(GENESIS_TIMESTAMP_SECS + number * BLOCK_TIME_SECS),
            "transactions": [],
        }))
    }

    pub fn raw_block(&self, number: u64) -> RawBlock {
        let value = self.block(number).expect("block must exist on the mock chain");
        raw_block_from_value(number, value).expect("mock block must parse")
    }

    /// Blocks `[start, end)` as the live indexer would have written them.
    pub fn raw_blocks(&self, start: u64, end: u64) -> Vec<RawBlock> {
        (start..end).map(|number| self.raw_block(number)).collect()
    }

    /// Makes the next `count` HTTP requests fail with a 503.
    pub fn fail_next_requests(&self, count: usize) {
        self.failing_requests.store(count, Ordering::SeqCst);
    }

    pub fn requested_blocks(&self) -> u64 {
        self.requested_blocks.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization
            .lock()
            .expect("mock chain poisoned")
            .clone()
    }

    fn take_failure(&self) -> bool {
        self.failing_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok()
    }
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

fn plain_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = status;
    response
}

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(plain_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "Unsupported method",
        ));
    }

    let authorization = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    *chain.last_authorization.lock().expect("mock chain poisoned") = authorization;

    if chain.take_failure() {
        return Ok(plain_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "node temporarily unavailable",
        ));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {err}"),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(plain_response(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    let response_value = match payload {
        Value::Array(calls) => Value::Array(
            calls
                .into_iter()
                .map(|call| handle_call(&chain, call))
                .collect(),
        ),
        call => handle_call(&chain, call),
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(chain: &MockChain, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));

    match method.as_str() {
        "eth_getBlockByNumber" => {
            let number = params
                .as_array()
                .and_then(|arr| arr.first())
                .and_then(Value::as_str)
                .and_then(|quantity| parse_quantity(quantity).ok());
            match number {
                Some(number) => {
                    chain.requested_blocks.fetch_add(1, Ordering::SeqCst);
                    success(id, chain.block(number).unwrap_or(Value::Null))
                }
                None => error(id, -32602, "invalid block number parameter"),
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
