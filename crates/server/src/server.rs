//! TCP accept loop: one task per connection, framed request/response.

use crate::handlers::{dispatch, ServerState};
use crate::protocol::{read_message, write_message};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Serve connections until the listener fails or the task is aborted.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!("connection from {peer}");
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                if e.kind() != std::io::ErrorKind::UnexpectedEof {
                    tracing::warn!("connection {peer} closed: {e}");
                }
            }
        });
    }
}

/// Process framed requests sequentially until the peer hangs up.
async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) -> std::io::Result<()> {
    let (reader, writer) = stream.into_split();
    let mut reader = tokio::io::BufReader::new(reader);
    let mut writer = tokio::io::BufWriter::new(writer);
    loop {
        let (msg_type, payload) = read_message(&mut reader).await?;
        let (reply_type, body) = dispatch(&state, msg_type, &payload);
        write_message(&mut writer, reply_type, &body).await?;
    }
}
