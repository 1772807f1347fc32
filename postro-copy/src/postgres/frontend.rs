//! Postgres Frontend Messages
//!
//! <https://www.postgresql.org/docs/current/protocol-message-formats.html>
use bytes::{Buf, BufMut, BytesMut};

use crate::ext::{BufMutExt, StrExt, UsizeExt};

/// Largest body of a single `CopyData` message.
///
/// Message length is a signed `Int32` that includes itself.
pub const MAX_COPY_DATA: usize = i32::MAX as usize - 4;

/// Write a frontend message to `buf`.
pub fn write<F: FrontendProtocol>(msg: F, buf: &mut BytesMut) {
    // msgtype + length
    const PREFIX: usize = 1 + 4;

    let size_hint = msg.size_hint();
    buf.reserve(PREFIX + size_hint as usize);

    let offset = buf.len();
    buf.put_u8(F::MSGTYPE);
    buf.put_u32(4 + size_hint);

    msg.encode(&mut *buf);

    assert_eq!(
        buf.len() - offset,
        PREFIX + size_hint as usize,
        "Frontend message body size not equal to size hint"
    );
}

/// A type which can be encoded into postgres frontend message
pub trait FrontendProtocol {
    /// Message type.
    const MSGTYPE: u8;

    /// Size of the main body.
    ///
    /// Note that this is **only** the size of main body as oppose of actual postgres message which
    /// include the length itself.
    fn size_hint(&self) -> u32;

    /// Write the main body of the message.
    ///
    /// The lenght of body written must be equal to the
    /// length returned by [`size_hint`][FrontendProtocol::size_hint].
    fn encode(self, buf: impl BufMut);
}

/// Identifies the message as a simple query
pub struct Query<'a> {
    /// the query string itself
    pub sql: &'a str,
}

impl FrontendProtocol for Query<'_> {
    const MSGTYPE: u8 = b'Q';

    fn size_hint(&self) -> u32 {
        self.sql.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.sql);
    }
}

/// Identifies the message as `COPY` data.
///
/// Data that forms part of a `COPY` data stream. Messages sent from the backend will always
/// correspond to single data rows, but messages sent by frontends might divide the data
/// stream arbitrarily.
///
/// Encoding consumes `data`, so the buffer is released as soon as it is written.
pub struct CopyData<B> {
    pub data: B,
}

impl<B: Buf> FrontendProtocol for CopyData<B> {
    const MSGTYPE: u8 = b'd';

    fn size_hint(&self) -> u32 {
        self.data.remaining().to_u32()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put(self.data);
    }
}

/// Identifies the message as a `COPY`-complete indicator.
pub struct CopyDone;

impl FrontendProtocol for CopyDone {
    const MSGTYPE: u8 = b'c';

    fn size_hint(&self) -> u32 { 0 }

    fn encode(self, _: impl BufMut) { }
}

/// Identifies the message as a `COPY`-failure indicator.
pub struct CopyFail<'a> {
    /// An error message to report as the cause of failure.
    pub message: &'a str,
}

impl FrontendProtocol for CopyFail<'_> {
    const MSGTYPE: u8 = b'f';

    fn size_hint(&self) -> u32 {
        self.message.nul_string_len()
    }

    fn encode(self, mut buf: impl BufMut) {
        buf.put_nul_string(self.message);
    }
}

#[cfg(test)]
mod test {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn query_frame() {
        let mut buf = BytesMut::new();
        write(Query { sql: "COPY t FROM STDIN" }, &mut buf);
        assert_eq!(buf[0], b'Q');
        assert_eq!(u32::from_be_bytes(buf[1..5].try_into().unwrap()), 4 + 18);
        assert_eq!(&buf[5..], b"COPY t FROM STDIN\0");
    }

    #[test]
    fn copy_data_frame_is_raw() {
        let mut buf = BytesMut::new();
        write(CopyData { data: Bytes::from_static(b"1\tfoo\n") }, &mut buf);
        assert_eq!(&buf[..], b"d\0\0\0\x0a1\tfoo\n");
    }

    #[test]
    fn copy_data_chained_buf() {
        let mut buf = BytesMut::new();
        let data = Buf::chain(&b"1\t"[..], &b"foo\n"[..]);
        write(CopyData { data }, &mut buf);
        assert_eq!(&buf[5..], b"1\tfoo\n");
    }

    #[test]
    fn copy_done_and_fail() {
        let mut buf = BytesMut::new();
        write(CopyDone, &mut buf);
        write(CopyFail { message: "oops" }, &mut buf);
        assert_eq!(&buf[..], b"c\0\0\0\x04f\0\0\0\x09oops\0");
    }
}
