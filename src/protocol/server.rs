//! Command socket server
//!
//! Every connection is its own task reading newline-delimited lines. A block
//! ends at an empty line; the dispatcher lock is held only while one block
//! is processed, so blocks from different connections never interleave.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use uuid::Uuid;

use super::dispatcher::{BlockOutcome, Dispatcher};
use super::quoting;
use crate::error::{Error, Result};

/// Longest accepted request line
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

pub type SharedDispatcher = Arc<Mutex<Dispatcher>>;

fn codec_error(e: LinesCodecError) -> Error {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            Error::Framing(format!("line longer than {} bytes", MAX_LINE_LENGTH))
        }
        LinesCodecError::Io(e) => Error::Io(e),
    }
}

/// Accepts connections on any number of listeners and signals shutdown when
/// a client sends `quitquitquit`
#[derive(Clone)]
pub struct Server {
    dispatcher: SharedDispatcher,
    shutdown: Arc<Notify>,
}

impl Server {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(Mutex::new(dispatcher)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn dispatcher(&self) -> SharedDispatcher {
        self.dispatcher.clone()
    }

    /// Resolves once a client asked the process to stop
    pub async fn shutdown_requested(&self) {
        self.shutdown.notified().await
    }

    pub async fn serve_tcp(&self, listener: TcpListener) -> Result<()> {
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!(peer = %peer, "Accepted TCP connection");
            self.spawn_connection(stream);
        }
    }

    #[cfg(unix)]
    pub async fn serve_unix(&self, listener: tokio::net::UnixListener) -> Result<()> {
        loop {
            let (stream, _addr) = listener.accept().await?;
            self.spawn_connection(stream);
        }
    }

    fn spawn_connection<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let server = self.clone();
        tokio::spawn(async move {
            if let Err(e) = server.handle_connection(stream).await {
                tracing::warn!(error = %e, "Connection ended with error");
            }
        });
    }

    /// Serve one connection until it closes, quits or fails framing
    pub async fn handle_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let id = Uuid::new_v4().simple().to_string();
        tracing::info!(connection = %id, "Connection opened");

        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut block: Vec<String> = Vec::new();

        let result = loop {
            let line = match framed.next().await {
                Some(Ok(line)) => Some(line),
                Some(Err(e)) => {
                    let e = codec_error(e);
                    if matches!(e, Error::Framing(_)) {
                        let record = super::dispatcher::error_record(&e);
                        let _ = send_records(&mut framed, vec![record]).await;
                    }
                    break Err(e);
                }
                None => None,
            };

            let at_eof = line.is_none();
            match line {
                Some(line) if !line.trim().is_empty() => {
                    block.push(line);
                    continue;
                }
                None if block.is_empty() => break Ok(()),
                _ => {}
            }

            let lines = std::mem::take(&mut block);
            let outcome = self.dispatcher.lock().await.process_lines(&lines);
            match outcome {
                BlockOutcome::Reply(records) => {
                    if let Err(e) = send_records(&mut framed, records).await {
                        break Err(e);
                    }
                    if at_eof {
                        break Ok(());
                    }
                }
                BlockOutcome::ReplyAndClose(records) => {
                    break send_records(&mut framed, records).await;
                }
                BlockOutcome::Close => break Ok(()),
                BlockOutcome::Shutdown => {
                    tracing::info!(connection = %id, "Shutdown requested");
                    self.shutdown.notify_one();
                    break Ok(());
                }
            }
        };

        tracing::info!(connection = %id, "Connection closed");
        result
    }
}

async fn send_records<S>(framed: &mut Framed<S, LinesCodec>, records: Vec<Vec<String>>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for record in records {
        framed.feed(quoting::join(&record)).await.map_err(codec_error)?;
    }
    framed.feed(String::new()).await.map_err(codec_error)?;
    SinkExt::<String>::flush(framed).await.map_err(codec_error)
}

/// Bind a Unix socket, removing a stale socket file first
#[cfg(unix)]
pub fn bind_unix(path: &std::path::Path) -> Result<tokio::net::UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let listener = tokio::net::UnixListener::bind(path)?;
    tracing::info!(path = %path.display(), "Listening on unix socket");
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ObjectSchema, ParamObject, ParamSpec, ParamType, Tree};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn server() -> Server {
        let root = ObjectSchema::new("Root")
            .with_param(ParamSpec::read_write("Test", ParamType::String));
        let root = ParamObject::new(Arc::new(root)).with_value("Test", "hi there");
        Server::new(Dispatcher::new(Tree::new(Box::new(root))))
    }

    async fn exchange(server: &Server, request: &str) -> String {
        let (mut client, remote) = tokio::io::duplex(4096);
        let server = server.clone();
        let task = tokio::spawn(async move { server.handle_connection(remote).await });
        client.write_all(request.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();
        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        task.await.unwrap().unwrap();
        out
    }

    #[tokio::test]
    async fn test_block_round_trip() {
        let server = server();
        let out = exchange(&server, "get Test\n\nset Test 'new value'\nget Test\n\n").await;
        assert_eq!(
            out,
            "OK\nTest 'hi there'\n\nOK\nTest 'new value'\nTest 'new value'\n\n"
        );
    }

    #[tokio::test]
    async fn test_partial_block_at_eof_is_processed() {
        let out = exchange(&server(), "get Test").await;
        assert_eq!(out, "OK\nTest 'hi there'\n\n");
    }

    #[tokio::test]
    async fn test_framing_error_closes_connection() {
        let out = exchange(&server(), "get 'Test\n\nget Test\n\n").await;
        assert!(out.starts_with("ERROR 9003 "));
        assert_eq!(out.matches("\n\n").count(), 1);
    }

    #[tokio::test]
    async fn test_quitquitquit_signals_shutdown() {
        let server = server();
        let out = exchange(&server, "quitquitquit\n\n").await;
        assert_eq!(out, "");
        tokio::time::timeout(std::time::Duration::from_secs(1), server.shutdown_requested())
            .await
            .unwrap();
    }
}
