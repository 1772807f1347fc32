#![allow(dead_code)]
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::{
    collections::VecDeque,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use postro_copy::{
    PgTransport, Result,
    postgres::{BackendProtocol, ErrorResponse, FrontendProtocol, frontend},
};

/// Scripted in-memory transport.
///
/// Backend messages are replayed from `backend`, `poll_recv` stays pending once the
/// script is exhausted.
#[derive(Default)]
pub struct MockTransport {
    backend: VecDeque<(u8, Bytes)>,
    pub sent: Vec<(u8, Bytes)>,
    pub flushes: usize,
    pub ready_requests: usize,
    ready_pending: usize,
    flush_budget: Option<usize>,
    flush_error: bool,
}

impl MockTransport {
    pub fn new<const N: usize>(script: [(u8, Bytes); N]) -> Self {
        Self { backend: script.into(), ..Default::default() }
    }

    /// Successful flush count before flush stays pending.
    pub fn flush_budget(mut self, budget: usize) -> Self {
        self.flush_budget = Some(budget);
        self
    }

    /// Fail flush once the budget is exhausted.
    pub fn flush_error(mut self) -> Self {
        self.flush_error = true;
        self
    }

    /// Message types sent so far.
    pub fn sent_types(&self) -> String {
        self.sent.iter().map(|(ty, _)| *ty as char).collect()
    }

    /// Bodies of sent messages with given type.
    pub fn sent_bodies(&self, msgtype: u8) -> Vec<&[u8]> {
        self.sent
            .iter()
            .filter(|(ty, _)| *ty == msgtype)
            .map(|(_, body)| &body[..])
            .collect()
    }
}

impl PgTransport for MockTransport {
    fn poll_flush(&mut self, _: &mut Context) -> Poll<io::Result<()>> {
        self.flushes += 1;
        match &mut self.flush_budget {
            Some(0) if self.flush_error => Poll::Ready(Err(io::ErrorKind::BrokenPipe.into())),
            Some(0) => Poll::Pending,
            Some(n) => {
                *n -= 1;
                Poll::Ready(Ok(()))
            },
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_recv<B: BackendProtocol>(&mut self, _: &mut Context) -> Poll<Result<B>> {
        loop {
            let Some((msgtype, body)) = self.backend.pop_front() else {
                return Poll::Pending;
            };
            if self.ready_pending != 0 {
                if msgtype == b'Z' {
                    self.ready_pending -= 1;
                }
                continue;
            }
            if msgtype == ErrorResponse::MSGTYPE {
                self.ready_pending += 1;
                let err = ErrorResponse::decode(msgtype, body)?;
                return Poll::Ready(Err(err.into()));
            }
            return Poll::Ready(Ok(B::decode(msgtype, body)?));
        }
    }

    fn ready_request(&mut self) {
        self.ready_requests += 1;
        self.ready_pending += 1;
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        let mut buf = BytesMut::new();
        frontend::write(message, &mut buf);
        let msgtype = buf.get_u8();
        let _len = buf.get_u32();
        self.sent.push((msgtype, buf.freeze()));
    }
}

// ===== Backend messages =====

pub fn copy_in_response() -> (u8, Bytes) {
    // text format, one text column
    (b'G', Bytes::from_static(b"\0\0\x01\0\0"))
}

pub fn copy_out_response() -> (u8, Bytes) {
    (b'H', Bytes::from_static(b"\0\0\x01\0\0"))
}

pub fn copy_both_response() -> (u8, Bytes) {
    (b'W', Bytes::from_static(b"\0\0\0"))
}

pub fn row_description() -> (u8, Bytes) {
    (b'T', Bytes::from_static(b"\0\x01?column?\0\0\0\0\0\0\0\0\0\x17\0\x04\xff\xff\xff\xff\0\0"))
}

pub fn data_row(value: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put_u16(1);
    body.put_u32(value.len() as u32);
    body.put(value.as_bytes());
    (b'D', body.freeze())
}

pub fn command_complete(tag: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    body.put(tag.as_bytes());
    body.put_u8(0);
    (b'C', body.freeze())
}

pub fn empty_query() -> (u8, Bytes) {
    (b'I', Bytes::new())
}

pub fn error_response(code: &str, message: &str) -> (u8, Bytes) {
    let mut body = BytesMut::new();
    for (ty, value) in [(b'S', "ERROR"), (b'C', code), (b'M', message)] {
        body.put_u8(ty);
        body.put(value.as_bytes());
        body.put_u8(0);
    }
    body.put_u8(0);
    (b'E', body.freeze())
}

pub fn ready() -> (u8, Bytes) {
    (b'Z', Bytes::from_static(b"I"))
}

// ===== Copy data =====

/// A buffer that counts its own release.
pub struct Chunk {
    data: Bytes,
    released: Arc<AtomicUsize>,
}

impl Buf for Chunk {
    fn remaining(&self) -> usize {
        self.data.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.data.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.data.advance(cnt);
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Release counter of each chunk.
pub struct Releases(Vec<Arc<AtomicUsize>>);

impl Releases {
    pub fn counts(&self) -> Vec<usize> {
        self.0.iter().map(|e| e.load(Ordering::SeqCst)).collect()
    }

    /// Asserts every chunk is released exactly once.
    pub fn assert_released_once(&self) {
        assert_eq!(self.counts(), vec![1; self.0.len()]);
    }
}

pub fn chunks(rows: &[&'static str]) -> (Vec<Chunk>, Releases) {
    let releases: Vec<_> = rows.iter().map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let chunks = rows
        .iter()
        .zip(&releases)
        .map(|(row, released)| Chunk {
            data: Bytes::from_static(row.as_bytes()),
            released: released.clone(),
        })
        .collect();
    (chunks, Releases(releases))
}
