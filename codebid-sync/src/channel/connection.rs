use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::credential::Credential;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    #[error("push channel refused the credential")]
    Unauthorized,
    #[error("push channel unreachable: {0}")]
    Unreachable(String),
}

/// Text frames of one live connection. Ends when the connection closes.
pub type FrameStream = BoxStream<'static, Result<String, ConnectError>>;

/// Opens one authenticated push connection.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, credential: &Credential) -> Result<FrameStream, ConnectError>;
}

/// WebSocket transport; the credential travels as a bearer header in the
/// upgrade request.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, credential: &Credential) -> Result<FrameStream, ConnectError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ConnectError::Unreachable(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credential.token()))
            .map_err(|_| ConnectError::Unauthorized)?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = match connect_async(request).await {
            Ok(connected) => connected,
            Err(WsError::Http(response)) if response.status() == StatusCode::UNAUTHORIZED => {
                return Err(ConnectError::Unauthorized);
            }
            Err(e) => return Err(ConnectError::Unreachable(e.to_string())),
        };

        let frames = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::warn!("Dropping non-utf8 binary frame");
                        None
                    }
                },
                Ok(_) => None,
                Err(e) => Some(Err(ConnectError::Unreachable(e.to_string()))),
            }
        });
        Ok(frames.boxed())
    }
}
