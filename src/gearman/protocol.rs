use anyhow::bail;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const REQ_MAGIC: &[u8; 4] = b"\0REQ";
pub const RES_MAGIC: &[u8; 4] = b"\0RES";

/// Upper bound on a single packet body; anything larger is a corrupt or
/// hostile frame, not a job payload.
const MAX_BODY: usize = 16 * 1024 * 1024;

/// The subset of Gearman packet types the bridge speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    CanDo,
    PreSleep,
    Noop,
    JobCreated,
    GrabJob,
    NoJob,
    JobAssign,
    WorkComplete,
    EchoReq,
    EchoRes,
    SubmitJobBg,
}

impl PacketType {
    pub fn code(self) -> u32 {
        match self {
            PacketType::CanDo => 1,
            PacketType::PreSleep => 4,
            PacketType::Noop => 6,
            PacketType::JobCreated => 8,
            PacketType::GrabJob => 9,
            PacketType::NoJob => 10,
            PacketType::JobAssign => 11,
            PacketType::WorkComplete => 13,
            PacketType::EchoReq => 16,
            PacketType::EchoRes => 17,
            PacketType::SubmitJobBg => 18,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(PacketType::CanDo),
            4 => Some(PacketType::PreSleep),
            6 => Some(PacketType::Noop),
            8 => Some(PacketType::JobCreated),
            9 => Some(PacketType::GrabJob),
            10 => Some(PacketType::NoJob),
            11 => Some(PacketType::JobAssign),
            13 => Some(PacketType::WorkComplete),
            16 => Some(PacketType::EchoReq),
            17 => Some(PacketType::EchoRes),
            18 => Some(PacketType::SubmitJobBg),
            _ => None,
        }
    }
}

/// One decoded frame: 12-byte header (magic, type, length) followed by
/// NUL-separated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketType,
    pub data: Vec<u8>,
}

impl Packet {
    /// Split the body into exactly `n` arguments. The last argument takes
    /// everything after the (n-1)th separator, so a job payload may
    /// contain NUL bytes without being cut short.
    pub fn split_args(&self, n: usize) -> anyhow::Result<Vec<&[u8]>> {
        let mut parts = Vec::with_capacity(n);
        let mut rest: &[u8] = &self.data;
        for _ in 0..n.saturating_sub(1) {
            match rest.iter().position(|b| *b == 0) {
                Some(idx) => {
                    parts.push(&rest[..idx]);
                    rest = &rest[idx + 1..];
                }
                None => bail!("{:?} packet is missing arguments", self.kind),
            }
        }
        parts.push(rest);
        Ok(parts)
    }
}

/// Encode a request frame: magic, big-endian type, big-endian body
/// length, then the arguments joined with NUL bytes.
pub fn encode_request(kind: PacketType, args: &[&[u8]]) -> Vec<u8> {
    let body = args.join(&b"\0"[..]);
    let mut buf = Vec::with_capacity(12 + body.len());
    buf.extend_from_slice(REQ_MAGIC);
    buf.extend_from_slice(&kind.code().to_be_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    buf
}

pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    kind: PacketType,
    args: &[&[u8]],
) -> anyhow::Result<()> {
    writer.write_all(&encode_request(kind, args)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one response frame from the server. Malformed frames are
/// connection-fatal: the caller drops the connection rather than trying
/// to resynchronize mid-stream.
pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> anyhow::Result<Packet> {
    let mut header = [0u8; 12];
    reader.read_exact(&mut header).await?;
    if &header[..4] != RES_MAGIC {
        bail!("bad packet magic {:?}", &header[..4]);
    }
    let code = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let size = u32::from_be_bytes([header[8], header[9], header[10], header[11]]) as usize;
    if size > MAX_BODY {
        bail!("packet body of {size} bytes exceeds limit");
    }
    let kind = match PacketType::from_code(code) {
        Some(kind) => kind,
        None => bail!("unknown packet type {code}"),
    };
    let mut data = vec![0u8; size];
    reader.read_exact(&mut data).await?;
    Ok(Packet { kind, data })
}
