//! The [`PgStream`] transport.
use bytes::{Buf, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    Config, Result,
    common::verbose,
    io::{poll_read, poll_write_all},
    postgres::{
        BackendProtocol, ErrorResponse, FrontendProtocol, NoticeResponse,
        backend::{NotificationResponse, ParameterStatus, ReadyForQuery},
        frontend,
    },
    transport::PgTransport,
};

/// msgtype + length
const HEADER: usize = 1 + 4;

/// Buffered postgres connection over an established io.
///
/// `PgStream` does not perform startup or authentication, it expects `io` to be a session
/// that is ready for query.
///
/// # Example
///
/// ```no_run
/// # async fn app(socket: tokio::net::TcpStream) -> postro_copy::Result<()> {
/// use postro_copy::PgStream;
///
/// let mut conn = PgStream::new(socket);
/// let data = futures::stream::iter([Ok::<_, std::io::Error>(&b"1\tfoo\n"[..])]);
///
/// let rows = postro_copy::copy_in("COPY foo FROM STDIN", data, &mut conn).await?;
/// assert_eq!(rows, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PgStream<IO> {
    io: IO,
    read_buf: BytesMut,
    write_buf: BytesMut,
    ready_pending: usize,
}

impl<IO> PgStream<IO> {
    /// Create new [`PgStream`] with default [`Config`].
    pub fn new(io: IO) -> Self {
        Self::with_config(io, &Config::default())
    }

    /// Create new [`PgStream`] with given [`Config`].
    pub fn with_config(io: IO, config: &Config) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(config.read_capacity),
            write_buf: BytesMut::with_capacity(config.write_capacity),
            ready_pending: 0,
        }
    }

    /// Returns a shared reference to the underlying io.
    pub fn get_ref(&self) -> &IO {
        &self.io
    }

    /// Returns a mutable reference to the underlying io.
    ///
    /// Reading or writing directly will corrupt the message stream.
    pub fn get_mut(&mut self) -> &mut IO {
        &mut self.io
    }

    /// Consumes self, returning the underlying io.
    ///
    /// Buffered messages that are not yet flushed are lost.
    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO> PgStream<IO>
where
    IO: AsyncRead + Unpin,
{
    /// Poll a full message frame, returning message type and its body.
    fn poll_frame(&mut self, cx: &mut Context) -> Poll<io::Result<(u8, bytes::Bytes)>> {
        loop {
            if let Some(mut header) = self.read_buf.get(..HEADER) {
                let msgtype = header.get_u8();
                let len = header.get_u32() as usize;

                if len < 4 {
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "invalid backend message length",
                    )));
                }

                if self.read_buf.len() >= 1 + len {
                    self.read_buf.advance(HEADER);
                    let body = self.read_buf.split_to(len - 4).freeze();
                    return Poll::Ready(Ok((msgtype, body)));
                }

                self.read_buf.reserve(1 + len - self.read_buf.len());
            }

            let n = ready!(poll_read(&mut self.io, &mut self.read_buf, cx))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }
}

impl<IO> PgTransport for PgStream<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(poll_write_all(&mut self.io, &mut self.write_buf, cx))?;
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        if !self.write_buf.is_empty() {
            ready!(self.poll_flush(cx))?;
        }

        loop {
            let (msgtype, body) = ready!(self.poll_frame(cx))?;

            verbose!("recv {}", crate::postgres::BackendMessage::message_name(msgtype));

            if self.ready_pending != 0 {
                if msgtype == ReadyForQuery::MSGTYPE {
                    self.ready_pending -= 1;
                }
                continue;
            }

            match msgtype {
                NoticeResponse::MSGTYPE => {
                    let _notice = NoticeResponse::decode(msgtype, body)?;
                    #[cfg(feature = "log")]
                    log::warn!("{_notice}");
                },
                ParameterStatus::MSGTYPE | NotificationResponse::MSGTYPE => { },
                ErrorResponse::MSGTYPE => {
                    // backend always follow with `ReadyForQuery`
                    self.ready_pending += 1;
                    let err = ErrorResponse::decode(msgtype, body)?;
                    return Poll::Ready(Err(err.into()));
                },
                _ => return Poll::Ready(Ok(B::decode(msgtype, body)?)),
            }
        }
    }

    fn ready_request(&mut self) {
        self.ready_pending += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        verbose!("send {:?}", F::MSGTYPE as char);
        frontend::write(message, &mut self.write_buf);
    }
}

#[cfg(test)]
mod test {
    use bytes::BufMut;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;
    use crate::{
        ErrorKind,
        postgres::{BackendMessage, backend::CommandComplete},
        transport::PgTransportExt,
    };

    fn frame(msgtype: u8, body: &[u8]) -> Vec<u8> {
        let mut buf = vec![msgtype];
        buf.put_u32(4 + body.len() as u32);
        buf.extend_from_slice(body);
        buf
    }

    #[tokio::test]
    async fn skip_async_messages() {
        let (client, mut server) = duplex(1024);
        let mut conn = PgStream::new(client);

        server.write_all(&frame(b'N', b"SNOTICE\0Mhello\0\0")).await.unwrap();
        server.write_all(&frame(b'S', b"TimeZone\0UTC\0")).await.unwrap();
        server.write_all(&frame(b'A', b"\0\0\0\x01chan\0payload\0")).await.unwrap();
        server.write_all(&frame(b'C', b"COPY 2\0")).await.unwrap();

        let cmd = conn.recv::<CommandComplete>().await.unwrap();
        assert_eq!(cmd.tag, "COPY 2");
    }

    #[tokio::test]
    async fn error_then_skip_until_ready() {
        let (client, mut server) = duplex(1024);
        let mut conn = PgStream::new(client);

        server.write_all(&frame(b'E', b"SERROR\0C42P01\0Mrelation \"t\" does not exist\0\0")).await.unwrap();
        server.write_all(&frame(b'Z', b"I")).await.unwrap();
        server.write_all(&frame(b'C', b"COPY 1\0")).await.unwrap();

        let err = conn.recv::<BackendMessage>().await.unwrap_err();
        let ErrorKind::Database(db) = err.kind() else {
            panic!("expected database error, found {err}")
        };
        assert_eq!(db.code(), Some("42P01"));

        let cmd = conn.recv::<CommandComplete>().await.unwrap();
        assert_eq!(cmd.tag, "COPY 1");
    }

    #[tokio::test]
    async fn ready_request_stacks() {
        let (client, mut server) = duplex(1024);
        let mut conn = PgStream::new(client);
        conn.ready_request();
        conn.ready_request();

        server.write_all(&frame(b'C', b"COPY 9\0")).await.unwrap();
        server.write_all(&frame(b'Z', b"I")).await.unwrap();
        server.write_all(&frame(b'E', b"SERROR\0Mignored\0\0")).await.unwrap();
        server.write_all(&frame(b'Z', b"I")).await.unwrap();
        server.write_all(&frame(b'Z', b"T")).await.unwrap();

        let ready = conn.recv::<ReadyForQuery>().await.unwrap();
        assert_eq!(ready.tx_status, b'T');
    }

    #[tokio::test]
    async fn frame_split_across_reads() {
        let (client, mut server) = duplex(1024);
        let mut conn = PgStream::with_config(client, &Config::default().read_capacity(2));

        let bytes = frame(b'C', b"COPY 12345\0");
        let task = tokio::spawn(async move {
            server.write_all(&bytes[..3]).await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&bytes[3..]).await.unwrap();
            server
        });

        let cmd = conn.recv::<CommandComplete>().await.unwrap();
        assert_eq!(cmd.tag, "COPY 12345");
        drop(task.await.unwrap());
    }

    #[tokio::test]
    async fn send_is_buffered_until_flush() {
        let (client, mut server) = duplex(1024);
        let mut conn = PgStream::new(client);

        conn.send(frontend::Query { sql: "COPY t FROM STDIN" });
        conn.send(frontend::CopyDone);
        conn.flush().await.unwrap();

        let mut buf = vec![0; 5 + 18 + 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[5..23], b"COPY t FROM STDIN\0");
        assert_eq!(&buf[23..], b"c\0\0\0\x04");
    }

    #[tokio::test]
    async fn eof_is_io_error() {
        let (client, server) = duplex(1024);
        let mut conn = PgStream::new(client);
        drop(server);

        let err = conn.recv::<BackendMessage>().await.unwrap_err();
        let ErrorKind::Io(e) = err.kind() else {
            panic!("expected io error, found {err}")
        };
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }
}
