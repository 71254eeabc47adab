//! WebSocket connector for the push channel.

use futures::future::{self, BoxFuture, FutureExt};
use futures::{StreamExt, TryStreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use super::channel::{Connector, FrameStream};
use super::PushError;

/// Connects to the backend `/ws` endpoint, authenticating with the bearer token.
#[derive(Debug, Clone)]
pub struct WsConnector {
  url: String,
  token: Option<String>,
}

impl WsConnector {
  pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
    Self {
      url: url.into(),
      token,
    }
  }

  async fn open(&self) -> Result<FrameStream, PushError> {
    let mut request = self.url.as_str().into_client_request()?;
    if let Some(token) = &self.token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| PushError::Config(e.to_string()))?;
      request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (stream, _) = tokio_tungstenite::connect_async(request).await?;

    // Text frames only; a close frame ends the connection with its reason.
    let frames = stream
      .map_err(PushError::from)
      .try_filter_map(|message| future::ready(text_frame(message)));

    Ok(frames.boxed())
  }
}

fn text_frame(message: Message) -> Result<Option<String>, PushError> {
  match message {
    Message::Text(text) => Ok(Some(text)),
    Message::Close(frame) => Err(PushError::Closed(
      frame
        .map(|f| format!("{} {}", f.code, f.reason))
        .unwrap_or_else(|| "no close frame".to_string()),
    )),
    _ => Ok(None),
  }
}

impl Connector for WsConnector {
  fn connect(&self) -> BoxFuture<'_, Result<FrameStream, PushError>> {
    self.open().boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheKey, CacheStore, Domain};
  use crate::push::{ChannelState, Notification, Notifier, PushChannel};
  use futures::SinkExt;
  use serde_json::json;
  use std::sync::{Arc, Mutex};
  use tokio::net::TcpListener;
  use tokio::sync::mpsc;
  use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

  #[tokio::test]
  async fn test_broadcast_over_websocket_clears_cache() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth = Arc::new(Mutex::new(None::<String>));

    let seen_auth = Arc::clone(&auth);
    tokio::spawn(async move {
      let (socket, _) = listener.accept().await.unwrap();
      let callback = |req: &Request, resp: Response| {
        *seen_auth.lock().unwrap() = req
          .headers()
          .get("authorization")
          .and_then(|v| v.to_str().ok())
          .map(String::from);
        Ok::<_, ErrorResponse>(resp)
      };
      let mut ws = tokio_tungstenite::accept_hdr_async(socket, callback)
        .await
        .unwrap();
      ws.send(Message::Text(r#"{"type":"hello"}"#.to_string()))
        .await
        .unwrap();
      ws.send(Message::Text(
        r#"{"type":"cache:clear","issuedAt":"2024-05-01T08:30:00Z"}"#.to_string(),
      ))
      .await
      .unwrap();
      // Keep the connection open until the client goes away.
      while ws.next().await.is_some() {}
    });

    let store = Arc::new(CacheStore::default());
    store.set(CacheKey::domain(Domain::Inventory), json!([{"sku": "A1"}]));

    let (tx, mut notes) = mpsc::unbounded_channel();
    let notifier: Arc<dyn Notifier> = Arc::new(move |n: Notification| {
      let _ = tx.send(n);
    });

    let connector = WsConnector::new(format!("ws://{}/ws", addr), Some("s3cret".to_string()));
    let channel = PushChannel::new(connector, Arc::clone(&store), notifier);
    let state = channel.subscribe();
    let handle = channel.spawn();

    let note = notes.recv().await.unwrap();
    assert_eq!(note, Notification::info("Cache cleared by administrator"));
    assert!(store.is_empty());
    assert_eq!(*state.borrow(), ChannelState::Connected);
    assert_eq!(auth.lock().unwrap().as_deref(), Some("Bearer s3cret"));
    handle.abort();
  }

  #[test]
  fn test_close_frame_ends_with_reason() {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    let close = Message::Close(Some(CloseFrame {
      code: CloseCode::Away,
      reason: "server restart".into(),
    }));
    match text_frame(close) {
      Err(PushError::Closed(reason)) => assert!(reason.contains("server restart")),
      other => panic!("unexpected frame result: {:?}", other),
    }
    assert_eq!(text_frame(Message::Ping(vec![1])).unwrap(), None);
    assert_eq!(
      text_frame(Message::Text("{}".to_string())).unwrap(),
      Some("{}".to_string())
    );
  }

  #[tokio::test]
  async fn test_invalid_url_fails_to_connect() {
    let connector = WsConnector::new("not a url", None);
    assert!(connector.connect().await.is_err());
  }
}
