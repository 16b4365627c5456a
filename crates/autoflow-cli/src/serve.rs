//! `autoflow serve`: the message API over JSON lines.
//!
//! Each stdin line is one request object (`{"type": "GET_STATS"}`, ...).
//! An optional `requestId` is echoed on the matching response line, since
//! requests are handled concurrently and may complete out of order.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use autoflow_intent::{Request, Response};
use autoflow_kernel::{RequestChannel, request_channel};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app;
use crate::config::AppConfig;

const REQUEST_ID: &str = "requestId";

/// Why the request loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    /// Input closed; every request read was answered.
    Drained,
    /// Interrupted; the shutdown hook ran before draining.
    Interrupted,
}

pub async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let service = Arc::new(app::build_service(config)?);
    let (client, receiver) = request_channel::<Request, Response>(
        config.service.queue_capacity,
        config.service.request_timeout(),
    );
    let server = tokio::spawn(Arc::clone(&service).serve(receiver));

    // Single writer task keeps response lines whole.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    info!("serving JSON-lines requests on stdin");
    let interrupt = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let ending = pump(
        BufReader::new(tokio::io::stdin()),
        &client,
        &out_tx,
        interrupt,
        || service.shutdown(),
    )
    .await?;
    debug!(?ending, "request loop finished");

    drop(client);
    drop(out_tx);
    let _ = server.await;
    let _ = writer.await;
    info!("server stopped");
    Ok(())
}

/// Answer every line of `input` concurrently, sending each reply to
/// `out_tx`.
///
/// At end of input the loop waits for the requests still in flight.  If
/// `interrupt` fires first, `on_interrupt` runs and the in-flight requests
/// are then drained the same way.
async fn pump<R, I>(
    input: R,
    client: &RequestChannel<Request, Response>,
    out_tx: &mpsc::UnboundedSender<String>,
    interrupt: I,
    on_interrupt: impl FnOnce(),
) -> Result<Ending>
where
    R: AsyncBufRead + Unpin,
    I: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut in_flight = JoinSet::new();
    let mut ending = Ending::Drained;
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read requests")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let client = client.clone();
                let out_tx = out_tx.clone();
                in_flight.spawn(async move {
                    let reply = answer(&client, &line).await;
                    let _ = out_tx.send(reply.to_string());
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(error) = joined {
                    warn!(%error, "request task failed");
                }
            }
            () = &mut interrupt => {
                info!("interrupt received");
                on_interrupt();
                ending = Ending::Interrupted;
                break;
            }
        }
    }

    debug!(pending = in_flight.len(), "waiting for in-flight requests");
    while let Some(joined) = in_flight.join_next().await {
        if let Err(error) = joined {
            warn!(%error, "request task failed");
        }
    }
    Ok(ending)
}

/// Parse one line, route it through the channel and render the reply.
async fn answer(client: &RequestChannel<Request, Response>, line: &str) -> Value {
    let (request_id, parsed) = parse_line(line);
    let response = match parsed {
        Ok(request) => {
            debug!(request = request.kind(), "request received");
            match client.call(request).await {
                Ok(response) => response,
                Err(error) => {
                    warn!(%error, "request failed in transit");
                    Response::err(error)
                }
            }
        }
        Err(error) => Response::err(format!("invalid request: {error}")),
    };
    render(request_id, &response)
}

fn parse_line(line: &str) -> (Option<Value>, Result<Request, serde_json::Error>) {
    match serde_json::from_str::<Value>(line) {
        Ok(mut value) => {
            let request_id = value
                .as_object_mut()
                .and_then(|map| map.remove(REQUEST_ID));
            (request_id, serde_json::from_value(value))
        }
        Err(error) => (None, Err(error)),
    }
}

fn render(request_id: Option<Value>, response: &Response) -> Value {
    let mut value = serde_json::to_value(response)
        .unwrap_or_else(|e| json!({"success": false, "error": e.to_string()}));
    if let (Some(id), Some(map)) = (request_id, value.as_object_mut()) {
        map.insert(REQUEST_ID.into(), id);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_split_off() {
        let (id, request) = parse_line(r#"{"type": "GET_STATS", "requestId": 7}"#);
        assert_eq!(id, Some(json!(7)));
        assert_eq!(request.unwrap(), Request::GetStats);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let (id, request) = parse_line(r#"{"type": "REBOOT", "requestId": "a"}"#);
        assert_eq!(id, Some(json!("a")));
        assert!(request.is_err());
    }

    #[test]
    fn response_echoes_request_id() {
        let rendered = render(Some(json!("r1")), &Response::ok(json!({"cleared": 0})));
        assert_eq!(
            rendered,
            json!({"success": true, "data": {"cleared": 0}, "requestId": "r1"})
        );
    }

    #[tokio::test]
    async fn malformed_line_gets_error_reply() {
        let (client, _receiver) =
            request_channel::<Request, Response>(1, std::time::Duration::from_secs(1));
        let reply = answer(&client, "not json").await;
        assert_eq!(reply["success"], false);
        assert!(reply["error"].as_str().unwrap().starts_with("invalid request"));
    }

    #[tokio::test]
    async fn requests_are_routed_to_the_service() {
        let service = Arc::new(app::build_service(&AppConfig::default()).unwrap());
        let (client, receiver) =
            request_channel::<Request, Response>(4, std::time::Duration::from_secs(5));
        tokio::spawn(Arc::clone(&service).serve(receiver));

        let reply = answer(&client, r#"{"type": "CLEAR_CACHE", "requestId": 1}"#).await;
        assert_eq!(
            reply,
            json!({"success": true, "data": {"cleared": 0}, "requestId": 1})
        );

        let reply = answer(&client, r#"{"type": "LIST_EXECUTIONS"}"#).await;
        assert_eq!(reply, json!({"success": true, "data": []}));
    }

    #[tokio::test]
    async fn end_of_input_waits_for_in_flight_requests() {
        let service = Arc::new(app::build_service(&AppConfig::default()).unwrap());
        let (client, receiver) =
            request_channel::<Request, Response>(4, std::time::Duration::from_secs(5));
        tokio::spawn(Arc::clone(&service).serve(receiver));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        let input: &[u8] = b"{\"type\": \"GET_STATS\", \"requestId\": 1}\n\n{\"type\": \"LIST_EXECUTIONS\", \"requestId\": 2}\n";
        let mut interrupted = false;
        let ending = pump(
            input,
            &client,
            &out_tx,
            std::future::pending(),
            || interrupted = true,
        )
        .await
        .unwrap();

        assert_eq!(ending, Ending::Drained);
        assert!(!interrupted);
        let mut replies = Vec::new();
        while let Ok(line) = out_rx.try_recv() {
            replies.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        replies.sort_by_key(|reply| reply[REQUEST_ID].as_u64());
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["success"], true);
        assert_eq!(replies[0]["data"]["activeExecutions"], 0);
        assert_eq!(replies[1], json!({"success": true, "data": [], "requestId": 2}));
    }

    #[tokio::test]
    async fn interrupt_runs_shutdown_hook() {
        let (client, _receiver) =
            request_channel::<Request, Response>(1, std::time::Duration::from_secs(1));
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let (_keep_open, input) = tokio::io::duplex(64);

        let mut interrupted = false;
        let ending = pump(
            BufReader::new(input),
            &client,
            &out_tx,
            std::future::ready(()),
            || interrupted = true,
        )
        .await
        .unwrap();

        assert_eq!(ending, Ending::Interrupted);
        assert!(interrupted);
    }
}
