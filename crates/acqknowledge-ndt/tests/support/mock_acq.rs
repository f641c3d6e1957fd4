#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

/// One XML-RPC request received by the mock, waiting for its reply.
pub struct MockCall {
    pub method: String,
    pub body: String,
    reply: oneshot::Sender<String>,
}

impl MockCall {
    /// Reply with a single `<value>` whose inner XML is `value_xml`
    /// (e.g. `<int>0</int>`).
    pub fn respond_value(self, value_xml: &str) {
        self.respond_raw(&value_response(value_xml));
    }

    pub fn respond_fault(self, code: i32, message: &str) {
        self.respond_raw(&fault_response(code, message));
    }

    pub fn respond_raw(self, xml: &str) {
        let _ = self.reply.send(xml.to_string());
    }
}

pub fn value_response(value_xml: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><params><param><value>{value_xml}</value></param></params></methodResponse>"
    )
}

pub fn fault_response(code: i32, message: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodResponse><fault><value><struct>\
<member><name>faultCode</name><value><int>{code}</int></value></member>\
<member><name>faultString</name><value><string>{message}</string></value></member>\
</struct></value></fault></methodResponse>"
    )
}

/// XML for a `{type, index}` channel struct.
pub fn channel_xml(kind: &str, index: u32) -> String {
    format!(
        "<struct><member><name>type</name><value><string>{kind}</string></value></member>\
<member><name>index</name><value><int>{index}</int></value></member></struct>"
    )
}

/// Minimal HTTP/1.1 server answering XML-RPC POSTs one call per connection.
pub struct MockAcqServer {
    addr: SocketAddr,
    call_rx: mpsc::Receiver<MockCall>,
    server_task: JoinHandle<()>,
}

impl MockAcqServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        let (call_tx, call_rx) = mpsc::channel(64);

        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => break,
                };
                let call_tx = call_tx.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, call_tx).await;
                });
            }
        });

        Ok(Self {
            addr,
            call_rx,
            server_task,
        })
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub async fn recv_call(&mut self) -> MockCall {
        timeout(STEP_TIMEOUT, self.call_rx.recv())
            .await
            .expect("timed out waiting for XML-RPC call")
            .expect("mock server call channel closed")
    }

    pub async fn recv_call_method(&mut self, expected_method: &str) -> MockCall {
        let call = self.recv_call().await;
        assert_eq!(call.method, expected_method, "unexpected method call");
        call
    }

    /// Answer every call with `handler(method, body)` until the returned
    /// task is aborted. Returns the log of methods seen.
    pub fn auto_respond<F>(mut self, mut handler: F) -> (JoinHandle<()>, Arc<Mutex<Vec<String>>>)
    where
        F: FnMut(&str, &str) -> String + Send + 'static,
    {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        let task = tokio::spawn(async move {
            while let Some(call) = self.call_rx.recv().await {
                seen.lock().unwrap().push(call.method.clone());
                let reply = handler(&call.method, &call.body);
                call.respond_raw(&reply);
            }
        });
        (task, log)
    }
}

impl Drop for MockAcqServer {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    call_tx: mpsc::Sender<MockCall>,
) -> std::io::Result<()> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    while raw.len() < header_end + content_length {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
    }

    let body = String::from_utf8_lossy(&raw[header_end..]).to_string();
    let method = between(&body, "<methodName>", "</methodName>").unwrap_or_default();

    let (reply_tx, reply_rx) = oneshot::channel();
    let call = MockCall {
        method,
        body,
        reply: reply_tx,
    };
    if call_tx.send(call).await.is_err() {
        return Ok(());
    }

    let Ok(xml) = reply_rx.await else {
        return Ok(());
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{xml}",
        xml.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn between(text: &str, start: &str, end: &str) -> Option<String> {
    let from = text.find(start)? + start.len();
    let to = from + text[from..].find(end)?;
    Some(text[from..to].to_string())
}
