//! In-process ShareDB server speaking the read-only subset the mirror uses

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

/// Documents served, keyed by `collection/id`
#[derive(Clone, Default)]
pub struct Workspace {
    docs: HashMap<String, Value>,
}

impl Workspace {
    pub fn brain(mut self, id: &str, main_cell: &str, title: &str) -> Self {
        self.docs.insert(
            format!("ot_brain/{id}"),
            json!({"mainCellId": main_cell, "title": title}),
        );
        self
    }

    pub fn cell(mut self, id: &str, title: &str, kind: &str, children: &[&str]) -> Self {
        self.docs.insert(
            format!("ot_cell/{id}"),
            json!({"title": title, "kind": kind, "childIds": children}),
        );
        self
    }
}

/// Running fake server
pub struct ShareDbServer {
    pub url: String,
    connections: Arc<Mutex<Vec<String>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl ShareDbServer {
    /// Serve `workspace`; every connection is dropped after `drop_after` if set
    pub async fn start(workspace: Workspace, drop_after: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let connections = Arc::new(Mutex::new(Vec::new()));
        let subscriptions = Arc::new(Mutex::new(Vec::new()));

        let (conns, subs) = (connections.clone(), subscriptions.clone());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let conn = serve(stream, workspace.clone(), conns.clone(), subs.clone());
                tokio::spawn(async move {
                    match drop_after {
                        Some(after) => {
                            let _ = tokio::time::timeout(after, conn).await;
                        }
                        None => conn.await,
                    }
                });
            }
        });

        Self {
            url,
            connections,
            subscriptions,
        }
    }

    /// `Cookie` header of every accepted connection, in order
    pub fn cookies(&self) -> Vec<String> {
        self.connections.lock().unwrap().clone()
    }

    /// `collection/id` of every subscribe request, in order
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }
}

async fn serve(
    stream: TcpStream,
    workspace: Workspace,
    connections: Arc<Mutex<Vec<String>>>,
    subscriptions: Arc<Mutex<Vec<String>>>,
) {
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let cookie = req
            .headers()
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        connections.lock().unwrap().push(cookie);
        Ok(resp)
    };
    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let init = json!({"a": "init", "protocol": 1, "id": "srv"});
    if ws.send(Message::Text(init.to_string().into())).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let reply = match frame["a"].as_str() {
            Some("hs") => json!({"a": "hs", "id": "srv", "protocol": 1}),
            Some("s") => {
                let c = frame["c"].as_str().unwrap_or_default();
                let d = frame["d"].as_str().unwrap_or_default();
                let key = format!("{c}/{d}");
                subscriptions.lock().unwrap().push(key.clone());
                match workspace.docs.get(&key) {
                    Some(data) => json!({"a": "s", "c": c, "d": d,
                        "data": {"v": 1, "type": "http://sharejs.org/types/JSONv0", "data": data}}),
                    None => json!({"a": "s", "c": c, "d": d, "data": {"v": 0}}),
                }
            }
            _ => continue,
        };
        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
            return;
        }
    }
}
