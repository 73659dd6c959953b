use crate::gearman::protocol::{read_packet, write_packet, PacketType};
use crate::pipeline::JobSink;
use anyhow::{bail, Context};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Destination-side client: submits background jobs to a Gearman server.
///
/// The connection is opened lazily on the first dispatch and dropped on
/// any protocol or I/O error; the next dispatch reconnects. Background
/// submission means the server only acknowledges job creation, no result
/// ever comes back.
pub struct BackgroundClient {
    server: String,
    conn: Mutex<Option<TcpStream>>,
}

impl BackgroundClient {
    pub fn new(server: &str) -> Self {
        BackgroundClient {
            server: server.to_string(),
            conn: Mutex::new(None),
        }
    }

    async fn submit(stream: &mut TcpStream, queue: &str, payload: &str) -> anyhow::Result<String> {
        // SUBMIT_JOB_BG: function name, unique id (left empty), payload
        write_packet(
            stream,
            PacketType::SubmitJobBg,
            &[queue.as_bytes(), b"", payload.as_bytes()],
        )
        .await?;
        let packet = read_packet(stream).await?;
        if packet.kind != PacketType::JobCreated {
            bail!("expected JOB_CREATED, got {:?}", packet.kind);
        }
        let args = packet.split_args(1)?;
        Ok(String::from_utf8_lossy(args[0]).into_owned())
    }
}

#[async_trait]
impl JobSink for BackgroundClient {
    async fn dispatch(&self, queue: &str, payload: &str) -> anyhow::Result<()> {
        let mut guard = self.conn.lock().await;
        let stream = match guard.as_mut() {
            Some(stream) => stream,
            None => {
                let stream = TcpStream::connect(&self.server)
                    .await
                    .with_context(|| format!("connecting to destination server {}", self.server))?;
                log::info!("connected to destination server {}", self.server);
                guard.insert(stream)
            }
        };
        match Self::submit(stream, queue, payload).await {
            Ok(handle) => {
                log::debug!("background job created on '{queue}': {handle}");
                Ok(())
            }
            Err(e) => {
                // drop the broken connection so the next dispatch starts fresh
                *guard = None;
                Err(e)
            }
        }
    }
}
