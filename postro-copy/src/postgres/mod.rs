//! Postgres Frontend and Backend Protocol
//!
//! Docs here mostly quoted from the official postgres documentation.
//!
//! ## Messaging Overview
//!
//! All communication is through a stream of messages. The first byte of a message identifies the message type,
//! and the next four bytes specify the length of the rest of the message (this length count includes itself,
//! but not the message-type byte). The remaining contents of the message are determined by the message type.
//!
//! ```text
//! ┏━━━━┳━━━━━━━━━━━━━━━━━━━┳━━━━━━┓
//! ┃ Ty ┃       Length      ┃ Body ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ u8 ┃        u32        ┃ [u8] ┃
//! ┣━━━━╋━━━━━━━━━━━━━━━━━━━╋━━━━━━┫
//! ┃ 64 ┃ 00 | 00 | 00 | 0a ┃  ..  ┃
//! ┗━━━━┻━━━━━━━━━━━━━━━━━━━┻━━━━━━┛
//! ```
//!
//! ## COPY Operations
//!
//! The `COPY` command allows high-speed bulk data transfer to or from the server.
//! Copy-in and copy-out operations each switch the connection into a distinct sub-protocol,
//! which lasts until the operation is completed.
//!
//! Copy-in mode (data transfer to the server) is initiated when the backend executes a
//! `COPY FROM STDIN` SQL statement. The backend sends a [`CopyInResponse`][1] message to the frontend.
//! The frontend should then send zero or more [`CopyData`][2] messages, forming a stream of input data.
//! The frontend can terminate the copy-in mode by sending either a [`CopyDone`][3] message,
//! allowing successful termination, or a [`CopyFail`][4] message, which will cause the
//! `COPY` SQL statement to fail with an error.
//!
//! <https://www.postgresql.org/docs/17/protocol-flow.html#PROTOCOL-COPY>
//!
//! [1]: backend::CopyInResponse
//! [2]: frontend::CopyData
//! [3]: frontend::CopyDone
//! [4]: frontend::CopyFail

mod pg_format;

pub mod frontend;
pub mod backend;

mod error;

pub use pg_format::PgFormat;

pub use frontend::FrontendProtocol;
pub use backend::{BackendMessage, BackendProtocol, ErrorResponse, NoticeResponse};
pub use error::ProtocolError;
