//! Scripted IRC server.
//!
//! Listens on a random local port; each accepted bot connection is driven
//! line by line from the test.

use sopel_proto::Message;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A listening fake server.
pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    /// Bind on `127.0.0.1` with an ephemeral port.
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }

    /// Wait for the bot to connect.
    pub async fn accept(&self) -> anyhow::Result<ServerConnection> {
        self.accept_timeout(Duration::from_secs(10)).await
    }

    pub async fn accept_timeout(&self, dur: Duration) -> anyhow::Result<ServerConnection> {
        let (stream, _) = timeout(dur, self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(ServerConnection {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }
}

/// The server side of one bot connection.
pub struct ServerConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl ServerConnection {
    /// Send a raw IRC line to the bot.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive one line from the bot, without CR-LF.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        self.recv_line_timeout(Duration::from_secs(5)).await
    }

    pub async fn recv_line_timeout(&mut self, dur: Duration) -> anyhow::Result<String> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("Bot closed the connection");
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Receive and parse one message.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let line = self.recv_line().await?;
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error on {:?}: {}", line, e))
    }

    /// Receive lines until one satisfies `predicate`; return them all.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<String>>
    where
        F: FnMut(&str) -> bool,
    {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await?;
            let done = predicate(&line);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Read the registration burst: `CAP LS 302`, then NICK and USER.
    pub async fn expect_registration(&mut self) -> anyhow::Result<Vec<String>> {
        self.recv_until(|line| line.starts_with("USER ")).await
    }

    /// Offer `caps`, acknowledge everything requested and wait for `CAP END`.
    pub async fn negotiate(&mut self, nick: &str, caps: &str) -> anyhow::Result<Vec<String>> {
        self.send_raw(&format!(":irc.test CAP * LS :{}", caps)).await?;
        let mut requested = Vec::new();
        loop {
            let line = self.recv_line().await?;
            if line == "CAP END" {
                return Ok(requested);
            }
            if let Some(cap) = line.strip_prefix("CAP REQ :") {
                self.send_raw(&format!(":irc.test CAP {} ACK :{}", nick, cap)).await?;
                requested.push(cap.to_string());
            }
        }
    }

    /// Finish registration with `001` and read the bot's post-welcome lines
    /// up to the JOIN of `channel`.
    pub async fn welcome(&mut self, nick: &str, channel: &str) -> anyhow::Result<Vec<String>> {
        self.send_raw(&format!(":irc.test 001 {} :Welcome to the test network", nick))
            .await?;
        let join = format!("JOIN {}", channel);
        self.recv_until(|line| line == join).await
    }

    /// Whether the bot closed its side before `dur` elapsed.
    pub async fn closed_within(&mut self, dur: Duration) -> bool {
        let mut line = String::new();
        matches!(
            timeout(dur, self.reader.read_line(&mut line)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}
