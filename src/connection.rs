use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::{RequestCodec, ResponseCodec};
use crate::frame::{Error, Frame, Response};

/// One accepted client connection. Requests are read through the `}` framing of
/// [`RequestCodec`] and responses are written one JSON object per line.
pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    reader: FramedRead<OwnedReadHalf, RequestCodec>,
    writer: FramedWrite<OwnedWriteHalf, ResponseCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr, max_frame_size: usize) -> Connection {
        let (reader, writer) = stream.into_split();

        Connection {
            id: Uuid::new_v4(),
            client_address,
            reader: FramedRead::new(reader, RequestCodec::new(max_frame_size)),
            writer: FramedWrite::new(writer, ResponseCodec::default()),
        }
    }

    /// The next request, or `None` once the peer closed the connection.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        self.reader.next().await.transpose()
    }

    pub async fn write_response(&mut self, response: Response) -> Result<(), Error> {
        self.writer.send(response).await
    }
}
