use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use rio_live_types::audio::Base64EncodedAudioBytes;
use rio_live_types::events::client::{AudioAppendEvent, SetupEvent, ToolResponseEvent};
use rio_live_types::session::SessionConfig;

use crate::types;

pub mod config;
mod consts;
mod utils;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type ClientTx = tokio::sync::mpsc::Sender<types::ClientEvent>;
type ServerTx = tokio::sync::broadcast::Sender<types::ServerEvent>;
pub type ServerRx = tokio::sync::broadcast::Receiver<types::ServerEvent>;

pub struct Connection {
    pub(crate) send_handle: tokio::task::JoinHandle<()>,
    pub(crate) recv_handle: tokio::task::JoinHandle<()>,
}

pub struct Client {
    capacity: usize,
    config: config::Config,
    c_tx: Option<ClientTx>,
    s_tx: Option<ServerTx>,
}

impl Client {
    fn new(capacity: usize, config: config::Config) -> Self {
        Self {
            capacity,
            config,
            c_tx: None,
            s_tx: None,
        }
    }

    async fn connect(&mut self) -> Result<Connection, BoxError> {
        if self.c_tx.is_some() {
            return Err("already connected".into());
        }

        let request = utils::build_request(&self.config)?;
        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;

        let (mut write, mut read) = ws_stream.split();

        let (c_tx, mut c_rx) = tokio::sync::mpsc::channel(self.capacity);
        let (s_tx, _) = tokio::sync::broadcast::channel(self.capacity);

        self.c_tx = Some(c_tx.clone());
        self.s_tx = Some(s_tx.clone());

        let send_handle = tokio::spawn(async move {
            while let Some(event) = c_rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            tracing::error!("failed to send message: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("failed to serialize event: {}", e);
                    }
                }
            }
        });

        let recv_handle = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Err(e) => {
                        tracing::error!("failed to read message: {}", e);
                        break;
                    }
                    Ok(message) => message,
                };
                match message {
                    Message::Text(text) => {
                        match serde_json::from_str::<types::ServerEvent>(&text) {
                            Ok(event) => {
                                if let Err(e) = s_tx.send(event) {
                                    tracing::error!("failed to send event: {}", e);
                                }
                            }
                            Err(e) => {
                                // Frames the protocol model doesn't know are
                                // logged and skipped, never fatal.
                                tracing::warn!("failed to deserialize event: {}, text=> {:?}", e, text);
                            }
                        }
                    }
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {:?}", reason);
                        let close = types::ServerEvent::Close {
                            reason: reason.map(|frame| frame.reason.to_string()),
                        };
                        if let Err(e) = s_tx.send(close) {
                            tracing::debug!("no subscriber for close event: {}", e);
                        }
                        break;
                    }
                    _ => {}
                }
            }
        });
        Ok(Connection {
            send_handle,
            recv_handle,
        })
    }

    pub async fn server_events(&mut self) -> Result<ServerRx, BoxError> {
        match self.s_tx {
            Some(ref tx) => Ok(tx.subscribe()),
            None => Err("not connected yet".into()),
        }
    }

    async fn send_client_event(&mut self, event: types::ClientEvent) -> Result<(), BoxError> {
        match self.c_tx {
            Some(ref tx) => {
                tx.send(event).await?;
                Ok(())
            }
            None => Err("not connected yet".into()),
        }
    }

    /// Declares the session: system prompt, output modality, voice and the
    /// tool schema. Must be the first event after connecting.
    pub async fn setup(&mut self, config: SessionConfig) -> Result<(), BoxError> {
        let event = types::ClientEvent::Setup(SetupEvent::new(config));
        self.send_client_event(event).await
    }

    pub async fn append_audio(&mut self, audio: Base64EncodedAudioBytes) -> Result<(), BoxError> {
        let event = types::ClientEvent::AudioAppend(AudioAppendEvent::new(audio));
        self.send_client_event(event).await
    }

    pub async fn send_tool_response(
        &mut self,
        id: String,
        name: String,
        result: String,
    ) -> Result<(), BoxError> {
        let event = types::ClientEvent::ToolResponse(ToolResponseEvent::new(id, name, result));
        self.send_client_event(event).await
    }
}

pub async fn connect_with_config(capacity: usize, config: config::Config) -> Result<Client, BoxError> {
    let mut client = Client::new(capacity, config);
    client.connect().await?;
    Ok(client)
}

pub async fn connect() -> Result<Client, BoxError> {
    let config = config::Config::new();
    connect_with_config(1024, config).await
}
