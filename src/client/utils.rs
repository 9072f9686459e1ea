use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::ClientConfig;

pub fn build_request(config: &ClientConfig) -> tokio_tungstenite::tungstenite::Result<Request> {
    let api_key = config.api_key().expose_secret();
    let url = if api_key.is_empty() {
        config.base_url().to_string()
    } else {
        format!("{}?key={}", config.base_url(), api_key)
    };
    url.into_client_request()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_with_key() {
        let config = ClientConfig::builder()
            .with_base_url("wss://example.com/live")
            .with_api_key("secret")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().path(), "/live");
        assert_eq!(request.uri().query(), Some("key=secret"));
    }

    #[test]
    fn test_build_request_without_key() {
        let config = ClientConfig::builder()
            .with_base_url("ws://127.0.0.1:9/live")
            .with_api_key("")
            .build();
        let request = build_request(&config).unwrap();
        assert_eq!(request.uri().query(), None);
    }
}
