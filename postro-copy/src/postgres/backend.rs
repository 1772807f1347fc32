//! Postgres Backend Messages
use bytes::{Buf, Bytes};
use std::fmt;

use super::{PgFormat, ProtocolError};
use crate::{
    common::ByteStr,
    ext::{BytesExt, FmtExt},
};

/// A type that can be decoded into postgres backend message
pub trait BackendProtocol: Sized {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError>;
}

/// Postgres backend messages
#[derive(Debug)]
pub enum BackendMessage {
    CommandComplete(CommandComplete),
    CopyBothResponse(CopyBothResponse),
    CopyData(CopyData),
    CopyDone(CopyDone),
    CopyInResponse(CopyInResponse),
    CopyOutResponse(CopyOutResponse),
    DataRow(DataRow),
    EmptyQueryResponse(EmptyQueryResponse),
    ErrorResponse(ErrorResponse),
    NoticeResponse(NoticeResponse),
    NotificationResponse(NotificationResponse),
    ParameterStatus(ParameterStatus),
    ReadyForQuery(ReadyForQuery),
    RowDescription(RowDescription),
}

macro_rules! match_backend {
    ($($name:ident,)*) => {
        impl BackendMessage {
            pub fn msgtype(&self) -> u8 {
                match self {
                    $(Self::$name(_) => $name::MSGTYPE,)*
                }
            }

            /// Get message name from message type.
            ///
            /// Returns `"Unknown"` for unknown message type.
            pub fn message_name(msgtype: u8) -> &'static str {
                match msgtype {
                    $($name::MSGTYPE => stringify!($name),)*
                    _ => "Unknown",
                }
            }
        }
        impl BackendProtocol for BackendMessage {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self, ProtocolError> {
                let message = match msgtype {
                    $($name::MSGTYPE => Self::$name(<$name as BackendProtocol>::decode(msgtype, body)?),)*
                    _ => return Err(ProtocolError::unknown(msgtype)),
                };
                Ok(message)
            }
        }
    };
}

match_backend! {
    CommandComplete,
    CopyBothResponse,
    CopyData,
    CopyDone,
    CopyInResponse,
    CopyOutResponse,
    DataRow,
    EmptyQueryResponse,
    ErrorResponse,
    NoticeResponse,
    NotificationResponse,
    ParameterStatus,
    ReadyForQuery,
    RowDescription,
}

impl BackendMessage {
    /// Create [`ProtocolError`] for this message being unexpected in `phase`.
    pub fn unexpected(&self, phase: &'static str) -> ProtocolError {
        ProtocolError::unexpected_phase(self.msgtype(), phase)
    }
}

macro_rules! assert_msgtype {
    ($typ:ident) => {
        if Self::MSGTYPE != $typ {
            return Err(ProtocolError::unexpected(Self::MSGTYPE,$typ))
        }
    };
}

/// Fail with [`ProtocolError::Malformed`] when `body` is shorter than `len`.
macro_rules! assert_len {
    ($body:ident, $len:expr) => {
        if $body.remaining() < $len {
            return Err(ProtocolError::malformed(Self::MSGTYPE, "message body too short"))
        }
    };
}

fn get_nul_str(msgtype: u8, body: &mut Bytes) -> Result<ByteStr, ProtocolError> {
    let bytes = body
        .get_nul_bytes()
        .ok_or(ProtocolError::malformed(msgtype, "string is not nul terminated"))?;
    ByteStr::from_utf8(bytes).map_err(|_|ProtocolError::malformed(msgtype, "string is not utf8"))
}

/// Identifies the message as a command-completed response
///
/// For an INSERT command, the tag is INSERT oid rows, where rows is the number of rows inserted.
/// oid used to be the object ID of the inserted row if rows was 1 and the target table had OIDs,
/// but OIDs system columns are not supported anymore; therefore oid is always 0.
///
/// For a DELETE command, the tag is DELETE rows where rows is the number of rows deleted.
///
/// For an UPDATE command, the tag is UPDATE rows where rows is the number of rows updated.
///
/// For a MERGE command, the tag is MERGE rows where rows is the number of rows inserted, updated, or deleted.
///
/// For a SELECT or CREATE TABLE AS command, the tag is SELECT rows where rows is the number of rows retrieved.
///
/// For a MOVE command, the tag is MOVE rows where rows is the number of rows
/// the cursor's position has been changed by.
///
/// For a FETCH command, the tag is FETCH rows where rows is the number of rows that have
/// been retrieved from the cursor.
///
/// For a COPY command, the tag is COPY rows where rows is the number of rows copied.
/// (Note: the row count appears only in PostgreSQL 8.2 and later.)
#[derive(Debug)]
pub struct CommandComplete {
    /// The command tag. This is usually a single word that identifies which SQL command was completed.
    pub tag: ByteStr,
}

impl CommandComplete {
    pub const MSGTYPE: u8 = b'C';
}

impl BackendProtocol for CommandComplete {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            tag: get_nul_str(msgtype, &mut body)?,
        })
    }
}

macro_rules! copy_response {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name {
            /// Indicates whether the overall `COPY` format is textual (rows separated by newlines,
            /// columns separated by separator characters, etc.) or binary (similar to DataRow format).
            pub format: PgFormat,
            /// The number of columns in the data to be copied.
            pub columns_len: u16,
            /// The format codes to be used for each column, each `Int16`.
            ///
            /// Each must presently be zero (text) or one (binary).
            /// All must be zero if the overall copy format is textual.
            pub column_formats: Bytes,
        }

        impl $name {
            pub const MSGTYPE: u8 = $ty;

            /// Returns the format of each column.
            pub fn column_formats(&self) -> impl Iterator<Item = Option<PgFormat>> + '_ {
                self.column_formats
                    .chunks_exact(2)
                    .map(|code| PgFormat::from_code(u16::from_be_bytes([code[0], code[1]])))
            }
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
                assert_msgtype!(msgtype);
                assert_len!(body, 1 + 2);
                let Some(format) = PgFormat::from_code(body.get_u8().into()) else {
                    return Err(ProtocolError::malformed(msgtype, "unknown copy format"));
                };
                let columns_len = body.get_u16();
                assert_len!(body, columns_len as usize * 2);
                Ok(Self { format, columns_len, column_formats: body })
            }
        }
    )*};
}

copy_response! {
    /// Identifies the message as a Start Copy In response.
    ///
    /// The frontend must now send copy-in data (if not prepared to do so, send a `CopyFail` message).
    struct CopyInResponse, b'G';

    /// Identifies the message as a Start Copy Out response.
    ///
    /// This message will be followed by copy-out data.
    struct CopyOutResponse, b'H';

    /// Identifies the message as a Start Copy Both response.
    ///
    /// This message is used only for Streaming Replication.
    struct CopyBothResponse, b'W';
}

/// Identifies the message as `COPY` data sent by the backend.
pub struct CopyData {
    /// Data that forms part of a `COPY` data stream.
    pub data: Bytes,
}

impl CopyData {
    pub const MSGTYPE: u8 = b'd';
}

impl BackendProtocol for CopyData {
    fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self { data: body })
    }
}

impl fmt::Debug for CopyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyData").field("data", &self.data.lossy()).finish()
    }
}

/// Identifies the message as a data row.
#[derive(Debug)]
pub struct DataRow {
    /// The number of column values that follow (possibly zero).
    pub column_len: u16,
    pub body: Bytes,
}

impl DataRow {
    pub const MSGTYPE: u8 = b'D';
}

impl BackendProtocol for DataRow {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        assert_len!(body, 2);
        Ok(Self {
            column_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a row description
#[derive(Debug)]
pub struct RowDescription {
    /// Specifies the number of fields in a row (can be zero).
    pub field_len: u16,
    /// Undecoded response body.
    pub body: Bytes,
}

impl RowDescription {
    pub const MSGTYPE: u8 = b'T';
}

impl BackendProtocol for RowDescription {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self, ProtocolError> {
        assert_msgtype!(msgtype);
        assert_len!(body, 2);
        Ok(Self {
            field_len: body.get_u16(),
            body,
        })
    }
}

/// Identifies the message as a run-time parameter status report
#[derive(Debug)]
pub struct ParameterStatus {
    /// The name of the run-time parameter being reported
    pub name: ByteStr,
    /// The current value of the parameter
    pub value: ByteStr,
}

impl ParameterStatus {
    pub const MSGTYPE: u8 = b'S';
}

impl BackendProtocol for ParameterStatus {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        Ok(Self {
            name: get_nul_str(msgtype, &mut body)?,
            value: get_nul_str(msgtype, &mut body)?,
        })
    }
}

/// Identifies the message as a notification response.
#[derive(Debug)]
pub struct NotificationResponse {
    /// The process ID of the notifying backend process.
    pub process_id: u32,
    /// The name of the channel that the notify has been raised on.
    pub channel: ByteStr,
    /// The “payload” string passed from the notifying process.
    pub payload: ByteStr,
}

impl NotificationResponse {
    pub const MSGTYPE: u8 = b'A';
}

impl BackendProtocol for NotificationResponse {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        assert_len!(body, 4);
        Ok(Self {
            process_id: body.get_u32(),
            channel: get_nul_str(msgtype, &mut body)?,
            payload: get_nul_str(msgtype, &mut body)?,
        })
    }
}

/// Identifies the message type. ReadyForQuery is sent whenever the backend is ready for a new query cycle.
#[derive(Debug)]
pub struct ReadyForQuery {
    /// Current backend transaction status indicator.
    ///
    /// Possible values are 'I' if idle (not in a transaction block);
    /// 'T' if in a transaction block; or 'E' if in a failed transaction block
    /// (queries will be rejected until block is ended).
    pub tx_status: u8,
}

impl ReadyForQuery {
    pub const MSGTYPE: u8 = b'Z';
}

impl BackendProtocol for ReadyForQuery {
    fn decode(msgtype: u8, mut body: Bytes) -> Result<Self,ProtocolError> {
        assert_msgtype!(msgtype);
        assert_len!(body, 1);
        Ok(Self { tx_status: body.get_u8() })
    }
}

/// Find identified field in `ErrorResponse` or `NoticeResponse` body.
fn find_field(mut body: &[u8], code: u8) -> Option<&str> {
    loop {
        let (&ty, rest) = body.split_first()?;
        if ty == 0 {
            return None;
        }
        let end = rest.iter().position(|e| matches!(e, b'\0'))?;
        if ty == code {
            return std::str::from_utf8(&rest[..end]).ok();
        }
        body = &rest[end + 1..];
    }
}

macro_rules! field_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
        $(#[$doc])*
        pub struct $name {
            pub body: Bytes,
        }

        impl $name {
            pub const MSGTYPE: u8 = $ty;

            /// Localized severity, e.g. `ERROR`, `FATAL`, `WARNING` or `NOTICE`.
            pub fn severity(&self) -> Option<&str> {
                find_field(&self.body, b'S')
            }

            /// The SQLSTATE code for the error.
            pub fn code(&self) -> Option<&str> {
                find_field(&self.body, b'C')
            }

            /// The primary human-readable error message.
            pub fn message(&self) -> Option<&str> {
                find_field(&self.body, b'M')
            }

            /// An optional secondary error message carrying more detail about the problem.
            pub fn detail(&self) -> Option<&str> {
                find_field(&self.body, b'D')
            }

            /// An optional suggestion what to do about the problem.
            pub fn hint(&self) -> Option<&str> {
                find_field(&self.body, b'H')
            }
        }

        impl BackendProtocol for $name {
            fn decode(msgtype: u8, body: Bytes) -> Result<Self,ProtocolError> {
                assert_msgtype!(msgtype);
                Ok(Self { body })
            }
        }

        impl std::error::Error for $name { }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{}: {}",
                    self.severity().unwrap_or("UNKNOWN"),
                    self.message().unwrap_or("no message"),
                )?;
                if let Some(code) = self.code() {
                    write!(f, " ({code})")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "\"{self}\"")
            }
        }
    )*};
}

field_msg! {
    /// Identifies the message as an error
    ///
    /// The message body consists of one or more identified fields, followed by a zero byte as a terminator.
    /// Fields can appear in any order.
    ///
    /// For each field there is the following:
    ///
    /// `Byte1` A code identifying the field type; if zero, this is the message terminator and no string follows.
    /// Since more field types might be added in future,
    /// frontends should silently ignore fields of unrecognized type.
    ///
    /// `String` The field value.
    struct ErrorResponse, b'E';

    /// A warning message. The frontend should display the message.
    ///
    /// The body layout is the same as [`ErrorResponse`].
    struct NoticeResponse, b'N';
}

macro_rules! unit_msg {
    ($(
        $(#[$doc:meta])* struct $name:ident, $ty:literal;
    )*) => {$(
            $(#[$doc])*
            #[derive(Debug)]
            pub struct $name;

            impl $name {
                pub const MSGTYPE: u8 = $ty;
            }

            impl BackendProtocol for $name {
                fn decode(msgtype: u8, _: Bytes) -> Result<Self,ProtocolError> {
                    if $name::MSGTYPE != msgtype {
                        return Err(ProtocolError::unexpected(Self::MSGTYPE,msgtype))
                    }
                    Ok(Self)
                }
            }
    )*};
}

unit_msg! {
    /// Identifies the message as a `COPY`-complete indicator.
    struct CopyDone, b'c';

    /// Identifies the message as a response to an empty query string.
    ///
    /// This substitutes for CommandComplete.
    struct EmptyQueryResponse, b'I';
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_copy_in_response() {
        let body = Bytes::from_static(b"\0\0\x02\0\0\0\0");
        let BackendMessage::CopyInResponse(res) = BackendMessage::decode(b'G', body).unwrap() else {
            panic!("expected CopyInResponse")
        };
        assert_eq!(res.format, PgFormat::Text);
        assert_eq!(res.columns_len, 2);
        assert!(res.column_formats().all(|f| f == Some(PgFormat::Text)));
    }

    #[test]
    fn decode_short_copy_in_response() {
        let body = Bytes::from_static(b"\x01\0\x02\0\x01");
        let err = CopyInResponse::decode(b'G', body).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { msgtype: b'G', .. }));
    }

    #[test]
    fn decode_command_complete() {
        let cmd = CommandComplete::decode(b'C', Bytes::from_static(b"COPY 3\0")).unwrap();
        assert_eq!(cmd.tag, "COPY 3");
        assert!(CommandComplete::decode(b'C', Bytes::from_static(b"COPY 3")).is_err());
    }

    #[test]
    fn decode_non_utf8_tag() {
        let err = CommandComplete::decode(b'C', Bytes::from_static(b"COPY \xff\0")).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { msgtype: b'C', .. }));
    }

    #[test]
    fn error_response_fields() {
        let body = Bytes::from_static(
            b"SERROR\0VERROR\0C22P02\0Minvalid input syntax for type integer: \"x\"\0\0",
        );
        let err = ErrorResponse::decode(b'E', body).unwrap();
        assert_eq!(err.severity(), Some("ERROR"));
        assert_eq!(err.code(), Some("22P02"));
        assert!(err.hint().is_none());
        assert_eq!(
            err.to_string(),
            "ERROR: invalid input syntax for type integer: \"x\" (22P02)",
        );
    }

    #[test]
    fn unknown_message() {
        let err = BackendMessage::decode(b'?', Bytes::new()).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected message `Unknown`");
    }

    #[test]
    fn message_name() {
        assert_eq!(BackendMessage::message_name(b'G'), "CopyInResponse");
        assert_eq!(BackendMessage::message_name(b'Z'), "ReadyForQuery");
    }
}
