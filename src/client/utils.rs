use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::config::Config;

pub fn build_request(config: &Config) -> tokio_tungstenite::tungstenite::Result<Request> {
    // The live endpoint authenticates with the key in the query string.
    let request = format!(
        "{}/live?model={}&key={}",
        config.base_url(),
        config.model(),
        config.api_key().expose_secret()
    )
    .into_client_request()?;
    Ok(request)
}
