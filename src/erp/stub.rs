//! Minimal HTTP/1.1 responder for exercising the REST client in tests.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
  pub method: String,
  /// Path including the query string
  pub path: String,
  pub headers: Vec<(String, String)>,
  pub body: String,
}

impl RecordedRequest {
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

type Responder = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

pub struct StubServer {
  pub base_url: String,
  requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
  /// Serve every request with `respond`, which returns status and JSON body.
  pub async fn start<F>(respond: F) -> Self
  where
    F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
  {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let respond: Responder = Arc::new(respond);

    let recorded = Arc::clone(&requests);
    tokio::spawn(async move {
      while let Ok((socket, _)) = listener.accept().await {
        let respond = Arc::clone(&respond);
        let recorded = Arc::clone(&recorded);
        tokio::spawn(async move {
          let _ = serve(socket, respond, recorded).await;
        });
      }
    });

    Self {
      base_url: format!("http://{}/api", addr),
      requests,
    }
  }

  pub fn requests(&self) -> Vec<RecordedRequest> {
    self.requests.lock().unwrap().clone()
  }
}

async fn serve(
  socket: TcpStream,
  respond: Responder,
  recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
  let mut reader = BufReader::new(socket);
  loop {
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await? == 0 {
      return Ok(());
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
      let mut line = String::new();
      reader.read_line(&mut line).await?;
      let line = line.trim_end();
      if line.is_empty() {
        break;
      }
      if let Some((name, value)) = line.split_once(':') {
        let (name, value) = (name.trim().to_string(), value.trim().to_string());
        if name.eq_ignore_ascii_case("content-length") {
          content_length = value.parse().unwrap_or(0);
        }
        headers.push((name, value));
      }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;

    let request = RecordedRequest {
      method,
      path,
      headers,
      body: String::from_utf8_lossy(&body).into_owned(),
    };
    let (status, response_body) = respond(&request);
    recorded.lock().unwrap().push(request);

    let response = format!(
      "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
      status,
      response_body.len(),
      response_body
    );
    reader.get_mut().write_all(response.as_bytes()).await?;
  }
}
