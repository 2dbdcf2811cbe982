use std::thread;
use std::time::Duration;

use thiserror::Error;

/// Timeouts and attempt count for one logical request.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

impl RequestPolicy {
    /// Single attempt, for requests with side effects.
    pub(crate) fn once(timeout: Duration) -> Self {
        Self {
            connect_timeout: timeout.min(Duration::from_secs(3)),
            read_timeout: timeout,
            attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub(crate) fn retrying(timeout: Duration, attempts: usize) -> Self {
        Self {
            connect_timeout: timeout.min(Duration::from_secs(3)),
            read_timeout: timeout,
            attempts,
            retry_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum HttpError {
    #[error("request failed: HTTP status {status}{detail}")]
    Status { status: u16, detail: String },
    #[error("request failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: usize, last: String },
    #[error("request failed: response decode failed: {0}")]
    Decode(String),
}

impl HttpError {
    pub(crate) fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn status_detail(response: ureq::Response) -> String {
    let response_body = response.into_string().ok().unwrap_or_default();
    let body = response_body.trim();
    if body.is_empty() {
        String::new()
    } else {
        let truncated = body.chars().take(240).collect::<String>();
        format!(" ({truncated})")
    }
}

fn build_agent(policy: &RequestPolicy) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build()
}

fn send_with_retries<F>(policy: &RequestPolicy, send: F) -> Result<String, HttpError>
where
    F: Fn(&ureq::Agent) -> Result<ureq::Response, ureq::Error>,
{
    let attempts = policy.attempts.max(1);
    let agent = build_agent(policy);

    for attempt in 1..=attempts {
        match send(&agent) {
            Ok(response) => {
                return response
                    .into_string()
                    .map_err(|err| HttpError::Decode(err.to_string()));
            }
            Err(ureq::Error::Status(status, response)) => {
                let detail = status_detail(response);
                if should_retry_http_status(status) && attempt < attempts {
                    thread::sleep(policy.retry_delay);
                    continue;
                }

                if should_retry_http_status(status) && attempts > 1 {
                    return Err(HttpError::Exhausted {
                        attempts,
                        last: format!("HTTP status {status}{detail}"),
                    });
                }

                return Err(HttpError::Status { status, detail });
            }
            Err(ureq::Error::Transport(err)) => {
                let transport_error = format!("transport error: {err}");
                if attempt < attempts {
                    thread::sleep(policy.retry_delay);
                    continue;
                }
                return Err(HttpError::Exhausted {
                    attempts,
                    last: transport_error,
                });
            }
        }
    }

    Err(HttpError::Exhausted {
        attempts,
        last: "exhausted attempts without a concrete error".to_string(),
    })
}

pub(crate) fn get_text_with_retries(
    url: &str,
    bearer: Option<&str>,
    query: &[(String, String)],
    policy: &RequestPolicy,
) -> Result<String, HttpError> {
    send_with_retries(policy, |agent| {
        let mut request = agent.get(url).set("Accept", "application/json");
        if let Some(token) = bearer {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        for (key, value) in query {
            request = request.query(key, value);
        }
        request.call()
    })
}

pub(crate) fn post_json(
    url: &str,
    bearer: Option<&str>,
    body: &str,
    policy: &RequestPolicy,
) -> Result<String, HttpError> {
    send_with_retries(policy, |agent| {
        let mut request = agent
            .post(url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        if let Some(token) = bearer {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request.send_string(body)
    })
}

#[cfg(test)]
pub(crate) mod test_server {
    use std::collections::VecDeque;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub(crate) enum Behavior {
        Respond(u16, String),
        DelayRespond(Duration, u16, String),
    }

    #[derive(Debug, Clone)]
    pub(crate) struct CapturedRequest {
        pub(crate) head: String,
        pub(crate) body: String,
    }

    #[derive(Debug)]
    pub(crate) struct TestServer {
        pub(crate) base_url: String,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        shutdown_tx: mpsc::Sender<()>,
        join_handle: Option<std::thread::JoinHandle<()>>,
    }

    impl TestServer {
        pub(crate) fn spawn(behaviors: Vec<Behavior>) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
            listener.set_nonblocking(true).expect("set nonblocking");
            let addr = listener.local_addr().expect("local addr");

            let requests = Arc::new(Mutex::new(Vec::new()));
            let requests_clone = Arc::clone(&requests);
            let shared_behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
            let behaviors_clone = Arc::clone(&shared_behaviors);
            let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

            let join_handle = std::thread::spawn(move || {
                loop {
                    if shutdown_rx.try_recv().is_ok() {
                        break;
                    }

                    match listener.accept() {
                        Ok((mut stream, _)) => {
                            let _ = stream.set_nonblocking(false);
                            let captured = consume_request(&mut stream).unwrap_or(
                                CapturedRequest {
                                    head: String::new(),
                                    body: String::new(),
                                },
                            );
                            requests_clone.lock().expect("lock requests").push(captured);
                            let behavior = {
                                let mut queue = behaviors_clone.lock().expect("lock behaviors");
                                queue.pop_front().unwrap_or_else(|| {
                                    Behavior::Respond(200, "default-ok".to_string())
                                })
                            };
                            std::thread::spawn(move || {
                                serve_behavior(&mut stream, behavior);
                            });
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                            std::thread::sleep(Duration::from_millis(5));
                        }
                        Err(_) => break,
                    }
                }
            });

            Self {
                base_url: format!("http://{addr}"),
                requests,
                shutdown_tx,
                join_handle: Some(join_handle),
            }
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().expect("lock requests").len()
        }

        pub(crate) fn requests(&self) -> Vec<CapturedRequest> {
            self.requests.lock().expect("lock requests").clone()
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            let _ = self.shutdown_tx.send(());
            if let Some(handle) = self.join_handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn consume_request(stream: &mut TcpStream) -> std::io::Result<CapturedRequest> {
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;
        let mut buf = [0_u8; 1024];
        let mut data = Vec::new();
        let mut header_end = None;
        loop {
            if let Some(end) = header_end {
                let head = String::from_utf8_lossy(&data[..end]).to_string();
                let expected = content_length(&head);
                if data.len() >= end + expected {
                    break;
                }
            }
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    data.extend_from_slice(&buf[..read]);
                    if header_end.is_none() {
                        header_end = data
                            .windows(4)
                            .position(|window| window == b"\r\n\r\n")
                            .map(|pos| pos + 4);
                    }
                }
                Err(err)
                    if err.kind() == std::io::ErrorKind::WouldBlock
                        || err.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(err) => return Err(err),
            }
        }
        let end = header_end.unwrap_or(data.len());
        Ok(CapturedRequest {
            head: String::from_utf8_lossy(&data[..end]).to_string(),
            body: String::from_utf8_lossy(&data[end..]).to_string(),
        })
    }

    fn content_length(head: &str) -> usize {
        head.lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    fn reason_phrase(status: u16) -> &'static str {
        match status {
            200 => "OK",
            400 => "Bad Request",
            402 => "Payment Required",
            404 => "Not Found",
            408 => "Request Timeout",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "Status",
        }
    }

    fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
        match behavior {
            Behavior::Respond(status, body) => {
                let _ = write_response(stream, status, &body);
            }
            Behavior::DelayRespond(delay, status, body) => {
                std::thread::sleep(delay);
                let _ = write_response(stream, status, &body);
            }
        }
    }

    fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
        let reason = reason_phrase(status);
        let payload = body.as_bytes();
        write!(
            stream,
            "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        )?;
        stream.write_all(payload)?;
        stream.flush()
    }
}
