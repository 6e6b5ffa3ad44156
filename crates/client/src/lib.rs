// Terminal client for the metro server.
// Forwards every stdin line to the server and prints every line it sends back.

use std::io::Write;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

mod network;

pub use network::Connection;

/// Why a relay session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The server closed the connection.
    ServerClosed,
    /// Local input ran out.
    InputClosed,
}

/// Connect to `addr` and relay between the terminal and the server.
pub async fn run(addr: &str) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    println!("Connected to {addr}");

    let stdin = BufReader::new(tokio::io::stdin());
    let exit = relay(stream, stdin, std::io::stdout()).await?;
    if exit == Exit::ServerClosed {
        println!("Connection closed by server.");
    }
    Ok(())
}

/// Pump lines both ways until either side closes.
pub async fn relay<S, I, O>(io: S, input: I, mut output: O) -> anyhow::Result<Exit>
where
    S: AsyncRead + AsyncWrite + Unpin,
    I: AsyncBufRead + Unpin,
    O: Write,
{
    let mut conn = Connection::new(io);
    let mut input = input.lines();

    let exit = loop {
        tokio::select! {
            frame = conn.recv() => match frame {
                Some(Ok(line)) => {
                    writeln!(output, "{line}")?;
                    output.flush()?;
                }
                Some(Err(e)) => {
                    warn!("Read error: {}", e);
                    break Exit::ServerClosed;
                }
                None => break Exit::ServerClosed,
            },
            line = input.next_line() => match line? {
                Some(line) => {
                    debug!("-> {}", line);
                    conn.send(line).await?;
                }
                None => break Exit::InputClosed,
            },
        }
    };

    if exit == Exit::InputClosed {
        let _ = conn.close().await;
    }
    Ok(exit)
}
