//! Row count of a completed statement.
use std::task::{Context, Poll, ready};

use crate::{
    Result,
    postgres::backend::{BackendMessage, CommandComplete},
    transport::PgTransport,
};

/// Reads the outcome of a statement whose input is complete.
///
/// Expects `CommandComplete` followed by `ReadyForQuery`. Server error is returned
/// by the transport as [`ErrorKind::Database`][crate::ErrorKind::Database].
#[derive(Debug, Default)]
pub struct ResultExtractor {
    rows: Option<u64>,
}

impl ResultExtractor {
    pub fn new() -> Self {
        Self { rows: None }
    }

    /// Poll for number of rows affected.
    pub fn poll_extract<IO: PgTransport>(&mut self, io: &mut IO, cx: &mut Context) -> Poll<Result<u64>> {
        loop {
            use BackendMessage::*;
            let message = ready!(io.poll_recv::<BackendMessage>(cx)?);
            match (self.rows, message) {
                (None, CommandComplete(cmd)) => {
                    self.rows = Some(command_complete(&cmd));
                },
                (Some(rows), ReadyForQuery(_)) => return Poll::Ready(Ok(rows)),
                (_, f) => {
                    if !matches!(f, ReadyForQuery(_)) {
                        io.ready_request();
                    }
                    return Poll::Ready(Err(f.unexpected("copy result").into()));
                },
            }
        }
    }
}

/// Decode information from [`CommandComplete`][1] message.
///
/// [1]: crate::postgres::backend::CommandComplete
pub fn command_complete(cmd: &CommandComplete) -> u64 {
    let mut whs = cmd.tag.split_whitespace();
    let Some(tag) = whs.next() else {
        return 0;
    };
    let Some(rows) = whs.next() else {
        return 0;
    };
    match tag {
        "INSERT" => whs.next().unwrap_or_default(),
        "SELECT" => rows,
        "UPDATE" => rows,
        "DELETE" => rows,
        "MERGE" => rows,
        "FETCH" => rows,
        "MOVE" => rows,
        "COPY" => rows,
        _ => return 0,
    }
    .parse()
    .unwrap_or_default()
}
