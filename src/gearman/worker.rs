use crate::config::Config;
use crate::gearman::protocol::{read_packet, write_packet, PacketType};
use crate::pipeline::{JobSink, Outcome, Pipeline};
use anyhow::{bail, Context};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Source-side worker: registers for the source queue and feeds every
/// assigned job through the pipeline, one at a time.
///
/// The source server always gets WORK_COMPLETE back, dropped jobs
/// included; a drop is a bridge decision, not a job failure to requeue.
pub struct Worker {
    server: String,
    queue: String,
    pipeline: Pipeline,
    sink: Arc<dyn JobSink>,
}

impl Worker {
    pub fn new(config: &Config, pipeline: Pipeline, sink: Arc<dyn JobSink>) -> Self {
        Worker {
            server: config.src.server.clone(),
            queue: config.src.queue.clone(),
            pipeline,
            sink,
        }
    }

    /// Serve forever, reconnecting with a fixed delay whenever the source
    /// connection drops.
    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            if let Err(e) = self.serve().await {
                log::warn!(
                    "source connection to {} lost: {e:#}; reconnecting in {}s",
                    self.server,
                    RECONNECT_DELAY.as_secs()
                );
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    async fn serve(&self) -> anyhow::Result<()> {
        let mut stream = TcpStream::connect(&self.server)
            .await
            .with_context(|| format!("connecting to source server {}", self.server))?;
        write_packet(&mut stream, PacketType::CanDo, &[self.queue.as_bytes()]).await?;
        log::info!("registered for queue '{}' on {}", self.queue, self.server);

        loop {
            write_packet(&mut stream, PacketType::GrabJob, &[]).await?;
            let packet = read_packet(&mut stream).await?;
            match packet.kind {
                PacketType::JobAssign => {
                    let args = packet.split_args(3)?;
                    let handle = args[0].to_vec();
                    let payload = String::from_utf8_lossy(args[2]).into_owned();
                    log::debug!(
                        "job {} assigned ({} bytes)",
                        String::from_utf8_lossy(&handle),
                        payload.len()
                    );
                    match self.pipeline.process(&payload, self.sink.as_ref()).await {
                        Outcome::Forwarded { queue } => {
                            log::info!("job forwarded to '{queue}'");
                        }
                        Outcome::Dropped(reason) => {
                            log::info!("job dropped: {reason}");
                        }
                    }
                    write_packet(&mut stream, PacketType::WorkComplete, &[&handle, b""]).await?;
                }
                PacketType::NoJob => {
                    write_packet(&mut stream, PacketType::PreSleep, &[]).await?;
                    // block until the server nudges us awake
                    let wake = read_packet(&mut stream).await?;
                    if wake.kind != PacketType::Noop {
                        log::debug!("unexpected {:?} while sleeping", wake.kind);
                    }
                }
                other => bail!("unexpected {other:?} packet from source server"),
            }
        }
    }
}
