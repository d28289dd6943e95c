//! Process-wide HTTP client
//!
//! Every outbound request (search proxy and Gemini) goes through one
//! pooled client so connections are reused across requests.

use reqwest::Client;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

/// Global HTTP client - reuses connections across requests
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

/// Get or create the global HTTP client
///
/// Features:
/// - Connection pooling
/// - Gzip/Brotli decompression
/// - TCP keepalive
/// - Timeouts sized for generative answers (up to 30s)
pub fn get_http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            // Timeouts
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            // Connection pooling
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            // Compression
            .gzip(true)
            .brotli(true)
            .user_agent(concat!(
                "askweb/",
                env!("CARGO_PKG_VERSION"),
                " (+https://github.com/user/askweb)"
            ))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "falling back to default HTTP client");
                Client::new()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_singleton() {
        let client1 = get_http_client();
        let client2 = get_http_client();
        assert!(std::ptr::eq(client1, client2));
    }
}
