//! Bulk load with `COPY FROM STDIN`.
//!
//! [`copy_in`] submits a `COPY .. FROM STDIN` statement, forwards a stream of buffers as
//! `CopyData` messages, then returns the number of rows copied.
//!
//! If the data stream yields an error, or the returned future is dropped before completion,
//! a `CopyFail` message is sent so the backend leaves copy-in mode and the connection
//! stays usable.
use bytes::Buf;
use futures_core::TryStream;
use std::{
    pin::Pin,
    task::{Context, Poll, Waker, ready},
};

use crate::{
    Result,
    common::{span, verbose},
    executor::Executor,
    postgres::{backend::BackendMessage, frontend},
    transport::PgTransport,
};

mod error;
pub mod extract;

pub use error::{BoxError, CopyDataError, InvalidStatement};
use extract::ResultExtractor;

/// Abort reason when the copy future is dropped mid operation.
const CANCELLED: &str = "Cancelled";

/// Entrypoint of the copy-in API.
///
/// `sql` must be a single `COPY .. FROM STDIN` statement, otherwise the copy fails with
/// [`ErrorKind::InvalidStatement`][crate::ErrorKind::InvalidStatement].
///
/// Each buffer yielded by `data` is sent as one `CopyData` message, in order.
///
/// # Example
///
/// ```no_run
/// # async fn app(mut conn: postro_copy::PgStream<tokio::net::TcpStream>) -> postro_copy::Result<()> {
/// use bytes::Bytes;
///
/// let rows = ["1\tfoo\n", "2\tbar\n"].map(|row| Ok::<_, std::io::Error>(Bytes::from(row)));
///
/// let n = postro_copy::copy_in("COPY post(id,name) FROM STDIN", futures::stream::iter(rows), &mut conn).await?;
/// assert_eq!(n, 2);
/// # Ok(())
/// # }
/// ```
pub fn copy_in<SQL, Exe, S>(sql: SQL, data: S, exe: Exe) -> CopyIn<SQL, Exe::Future, Exe::Transport, S>
where
    Exe: Executor,
    S: TryStream,
{
    CopyIn {
        sql,
        session: None,
        phase: Phase::Connect { f: exe.connection() },
        data,
        pending: None,
    }
}

pin_project_lite::pin_project! {
    /// Future returned by [`copy_in`].
    ///
    /// Dropping this future before completion aborts the copy.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct CopyIn<SQL, ExeFut, IO, S>
    where
        IO: PgTransport,
        S: TryStream,
    {
        sql: SQL,
        session: Option<CopySession<IO>>,
        phase: Phase<ExeFut>,
        #[pin]
        data: S,
        // buffer taken from `data` waiting for the transport to flush
        pending: Option<S::Ok>,
    }
}

#[derive(Debug)]
enum Phase<ExeFut> {
    Connect { f: ExeFut },
    Submit,
    Negotiate,
    Streaming,
    Done,
    AwaitingResult(ResultExtractor),
    Complete,
}

/// Settle the session and fail the copy.
macro_rules! fail {
    ($me:ident, $session:ident, $err:expr) => {{
        $session.state = SessionState::Settled;
        *$me.phase = Phase::Complete;
        return Poll::Ready(Err($err.into()));
    }};
}

impl<SQL, ExeFut, IO, S> Future for CopyIn<SQL, ExeFut, IO, S>
where
    SQL: AsRef<str>,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport,
    S: TryStream,
    S::Ok: Buf,
    S::Error: Into<BoxError>,
{
    type Output = Result<u64>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut me = self.project();

        span!("copy_in");

        loop {
            if let Phase::Connect { f } = &mut *me.phase {
                let io = ready!(Pin::new(f).poll(cx)?);
                *me.session = Some(CopySession { io, state: SessionState::Settled });
                *me.phase = Phase::Submit;
                continue;
            }

            // only `None` before connected
            let session = me.session.as_mut().expect("copy session connected");

            match &mut *me.phase {
                Phase::Connect { .. } => unreachable!(),
                Phase::Submit => {
                    session.io.send(frontend::Query { sql: me.sql.as_ref() });
                    session.state = SessionState::Armed;
                    *me.phase = Phase::Negotiate;
                },
                Phase::Negotiate => {
                    use BackendMessage::*;
                    let message = match ready!(session.io.poll_recv::<BackendMessage>(cx)) {
                        Ok(ok) => ok,
                        Err(err) => fail!(me, session, err),
                    };
                    match message {
                        CopyInResponse(_res) => {
                            verbose!(format = ?_res.format, columns = _res.columns_len, "copy in accepted");
                            *me.phase = Phase::Streaming;
                        },
                        // rows of a statement that is not a copy
                        RowDescription(_) | DataRow(_) => { },
                        ReadyForQuery(_) => {
                            let err = InvalidStatement::new(me.sql.as_ref(), message.msgtype());
                            fail!(me, session, err)
                        },
                        CommandComplete(_) | EmptyQueryResponse(_) | CopyOutResponse(_) => {
                            let err = InvalidStatement::new(me.sql.as_ref(), message.msgtype());
                            session.io.ready_request();
                            fail!(me, session, err)
                        },
                        CopyBothResponse(_) => {
                            let err = InvalidStatement::new(me.sql.as_ref(), message.msgtype());
                            session.io.send(frontend::CopyDone);
                            session.io.ready_request();
                            fail!(me, session, err)
                        },
                        f => {
                            session.io.ready_request();
                            fail!(me, session, f.unexpected("copy negotiation"))
                        },
                    }
                },
                Phase::Streaming => {
                    if me.pending.is_some() {
                        // previous data must leave the buffer first
                        if let Err(err) = ready!(session.io.poll_flush(cx)) {
                            fail!(me, session, err)
                        }
                        if let Some(data) = me.pending.take() {
                            session.io.send(frontend::CopyData { data });
                        }
                        continue;
                    }

                    let next = match me.data.as_mut().try_poll_next(cx) {
                        Poll::Ready(next) => next,
                        Poll::Pending => {
                            // do not hold written data while the stream is idle
                            if let Err(err) = ready!(session.io.poll_flush(cx)) {
                                fail!(me, session, err)
                            }
                            return Poll::Pending;
                        },
                    };

                    match next {
                        Some(Ok(data)) if data.remaining() > frontend::MAX_COPY_DATA => {
                            let err = BoxError::from(format!(
                                "copy data of {} bytes exceeds message limit of {} bytes",
                                data.remaining(),
                                frontend::MAX_COPY_DATA,
                            ));
                            abort(&mut session.io, &err.to_string());
                            fail!(me, session, CopyDataError::new(err))
                        },
                        Some(Ok(data)) => *me.pending = Some(data),
                        Some(Err(err)) => {
                            let err: BoxError = err.into();
                            abort(&mut session.io, &err.to_string());
                            fail!(me, session, CopyDataError::new(err))
                        },
                        None => {
                            session.io.send(frontend::CopyDone);
                            session.state = SessionState::Draining;
                            *me.phase = Phase::Done;
                        },
                    }
                },
                Phase::Done => {
                    if let Err(err) = ready!(session.io.poll_flush(cx)) {
                        fail!(me, session, err)
                    }
                    verbose!("copy data sent");
                    *me.phase = Phase::AwaitingResult(ResultExtractor::new());
                },
                Phase::AwaitingResult(extract) => {
                    let result = ready!(extract.poll_extract(&mut session.io, cx));
                    session.state = SessionState::Settled;
                    *me.phase = Phase::Complete;
                    return Poll::Ready(result);
                },
                Phase::Complete => panic!("`CopyIn` polled after completion"),
            }
        }
    }
}

/// Transport of an in-progress copy.
///
/// Dropping an armed session aborts the copy, dropping a draining session
/// discards the remaining response.
struct CopySession<IO: PgTransport> {
    io: IO,
    state: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Nothing is owed to the backend.
    Settled,
    /// `Query` is submitted and neither `CopyDone` nor `CopyFail` is sent.
    Armed,
    /// `CopyDone` is submitted, the result is not read yet.
    Draining,
}

impl<IO: PgTransport> Drop for CopySession<IO> {
    fn drop(&mut self) {
        match self.state {
            SessionState::Armed => abort(&mut self.io, CANCELLED),
            SessionState::Draining => self.io.ready_request(),
            SessionState::Settled => { },
        }
    }
}

/// Send `CopyFail` without waiting for it.
///
/// Backend responds with `ErrorResponse` then `ReadyForQuery`, both are discarded by the
/// transport. If the backend is not in copy-in mode, `CopyFail` is ignored and only
/// `ReadyForQuery` follows.
///
/// Whatever cannot be written right now goes out with the next flush of the transport.
fn abort<IO: PgTransport>(io: &mut IO, reason: &str) {
    let message = format!("Copy operation failed: {reason}");

    #[cfg(feature = "log")]
    log::debug!("{message}");

    io.send(frontend::CopyFail { message: &message });
    io.ready_request();

    let mut cx = Context::from_waker(Waker::noop());
    if let Poll::Ready(Err(_err)) = io.poll_flush(&mut cx) {
        #[cfg(feature = "log")]
        log::error!("failed to send CopyFail: {_err}");
    }
}

#[cfg(test)]
mod test {
    use super::copy_in;
    use crate::executor::Executor;

    #[allow(unused, reason = "type assertion")]
    async fn assert_type<E: Executor>(e: E) {
        let data = futures::stream::iter([Ok::<_, std::io::Error>(&b"1\n"[..])]);
        let _ = copy_in("COPY foo FROM STDIN", data, e).await;
    }

    #[allow(unused, reason = "type assertion")]
    async fn assert_type2<E: Executor>(e: E) {
        let mut e = e.connection().await.unwrap();
        let data = futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>();
        let _ = copy_in("COPY foo FROM STDIN", data, &mut e).await;
        let data = futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>();
        let _ = copy_in(String::from("COPY foo FROM STDIN"), data, &mut e).await;
    }
}
