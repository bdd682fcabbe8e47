// ABOUTME: Local callback server receiving OAuth redirects
// ABOUTME: Accepts a single request on localhost and extracts code, state, or error

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};
use tracing::{debug, error, info};

use crate::error::{AuthError, AuthResult};

pub const CALLBACK_PATH: &str = "/auth/callback";

/// Parameters delivered by a successful redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

/// Callback server already bound to its port, so bind failures surface
/// before the browser is opened
pub struct CallbackServer {
    listener: TcpListener,
    port: u16,
}

impl CallbackServer {
    /// Bind to 127.0.0.1 on the given port (0 picks a free port)
    pub async fn bind(port: u16) -> AuthResult<Self> {
        let addr = format!("127.0.0.1:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| AuthError::CallbackServer(format!("Failed to bind to {}: {}", addr, e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::CallbackServer(e.to_string()))?
            .port();

        Ok(Self { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the callback URL for this server
    pub fn callback_url(&self) -> String {
        format!("http://localhost:{}{}", self.port, CALLBACK_PATH)
    }

    /// Wait for the redirect. When `expected_state` is given, a callback
    /// carrying a different state is rejected.
    pub async fn wait_for_callback(self, expected_state: Option<&str>) -> AuthResult<CallbackParams> {
        info!("Waiting for OAuth callback on port {}", self.port);

        let (mut stream, peer_addr) = self.listener.accept().await.map_err(|e| {
            AuthError::CallbackServer(format!("Failed to accept connection: {}", e))
        })?;
        debug!("Received connection from {}", peer_addr);

        let mut buffer = vec![0; 4096];
        let n = stream
            .read(&mut buffer)
            .await
            .map_err(|e| AuthError::CallbackServer(format!("Failed to read request: {}", e)))?;
        let request = String::from_utf8_lossy(&buffer[..n]);

        let result = Self::parse_request(&request).and_then(|params| {
            match (expected_state, params.state.as_deref()) {
                (Some(expected), Some(returned)) if expected != returned => {
                    error!("OAuth state mismatch");
                    Err(AuthError::StateMismatch)
                }
                (Some(_), None) => Err(AuthError::StateMismatch),
                _ => Ok(params),
            }
        });

        let response = match &result {
            Ok(_) => html_response("200 OK", SUCCESS_HTML),
            Err(e) => html_response(
                "400 Bad Request",
                &format!(
                    "<html><body><h1>❌ Authentication Failed</h1><p>{}</p><p>You can close this tab and return to your terminal.</p></body></html>",
                    e
                ),
            ),
        };
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            error!("Failed to send callback response: {}", e);
        }

        result
    }

    /// Extract the callback parameters from the raw request
    pub fn parse_request(request: &str) -> AuthResult<CallbackParams> {
        let request_line = request.lines().next().unwrap_or_default();

        if let Some(code) = query_param(request_line, "code") {
            return Ok(CallbackParams {
                code,
                state: query_param(request_line, "state"),
            });
        }

        if let Some(error) = query_param(request_line, "error") {
            let description = query_param(request_line, "error_description")
                .map(|d| format!(": {}", d))
                .unwrap_or_default();
            return Err(AuthError::OAuthFailed(format!(
                "Provider error: {}{}",
                error, description
            )));
        }

        Err(AuthError::CallbackServer(
            "No authorization code found in callback".to_string(),
        ))
    }
}

/// Look up one query parameter in a `GET /path?a=1&b=2 HTTP/1.1` request line
fn query_param(request_line: &str, name: &str) -> Option<String> {
    let target = request_line.split_whitespace().nth(1)?;
    let (_, query) = target.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| {
            let value = value.replace('+', " ");
            urlencoding::decode(&value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or(value)
        })
        .filter(|value| !value.is_empty())
}

fn html_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

const SUCCESS_HTML: &str = r#"<html>
<head>
    <title>Signed in</title>
    <style>
        body { font-family: system-ui, -apple-system, sans-serif; max-width: 600px; margin: 100px auto; text-align: center; }
        h1 { color: #22c55e; }
        p { color: #64748b; }
    </style>
</head>
<body>
    <h1>✅ Signed in to Task Master</h1>
    <p>You can now close this tab and return to your terminal.</p>
</body>
</html>"#;
