use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use super::protocol::line_codec;
use crate::error::NodeError;

pub type FrameReader = FramedRead<OwnedReadHalf, LinesCodec>;
pub type FrameWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

pub async fn bind<A: ToSocketAddrs>(addr: A) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Open a TCP connection, giving up after `connect_timeout`.
pub async fn dial(addr: &str, connect_timeout: Duration) -> Result<TcpStream, NodeError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| NodeError::ConnectTimeout(addr.to_string()))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Split a stream into line-framed read and write halves.
pub fn framed(stream: TcpStream, max_frame_bytes: usize) -> (FrameReader, FrameWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        FramedRead::new(read_half, line_codec(max_frame_bytes)),
        FramedWrite::new(write_half, line_codec(max_frame_bytes)),
    )
}
