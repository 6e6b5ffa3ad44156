// Line-framed connection to the metro server
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::MAX_LINE_LENGTH;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

type Lines<S> = Framed<S, LinesCodec>;

pub struct Connection<S> {
    sink: SplitSink<Lines<S>, String>,
    stream: SplitStream<Lines<S>>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub fn new(io: S) -> Self {
        let framed = Framed::new(io, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let (sink, stream) = framed.split();
        Self { sink, stream }
    }

    /// Send one line; the terminator is added by the codec.
    pub async fn send(&mut self, line: String) -> Result<(), LinesCodecError> {
        self.sink.send(line).await
    }

    /// Next line from the server, `None` once it has closed the connection.
    pub async fn recv(&mut self) -> Option<Result<String, LinesCodecError>> {
        self.stream.next().await
    }

    pub async fn close(&mut self) -> Result<(), LinesCodecError> {
        self.sink.close().await
    }
}
