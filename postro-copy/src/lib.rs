//! Postgres `COPY FROM STDIN` Driver
//!
//! Streams bulk data into a table over an established, ready for query connection.
//!
//! # Examples
//!
//! ```no_run
//! use bytes::Bytes;
//! use postro_copy::PgStream;
//!
//! # async fn app(socket: tokio::net::TcpStream) -> postro_copy::Result<()> {
//! // `socket` already completed startup and authentication
//! let mut conn = PgStream::new(socket);
//!
//! let rows = (0..100).map(|i| Ok::<_, std::io::Error>(Bytes::from(format!("{i}\tfoo\n"))));
//!
//! let n = postro_copy::copy_in("COPY foo(id,name) FROM STDIN", futures::stream::iter(rows), &mut conn).await?;
//!
//! assert_eq!(n, 100);
//! # Ok(())
//! # }
//! ```
//!
//! Dropping the copy future before completion sends `CopyFail` to the backend,
//! so the connection can be reused afterwards:
//!
//! ```no_run
//! # async fn app(mut conn: postro_copy::PgStream<tokio::net::TcpStream>) -> postro_copy::Result<()> {
//! use std::time::Duration;
//!
//! let data = futures::stream::pending::<Result<bytes::Bytes, std::io::Error>>();
//! let copy = postro_copy::copy_in("COPY foo FROM STDIN", data, &mut conn);
//!
//! // the copy is aborted on timeout
//! let _ = tokio::time::timeout(Duration::from_secs(1), copy).await;
//!
//! let n = postro_copy::copy_in("COPY foo FROM STDIN", futures::stream::empty::<Result<bytes::Bytes, std::io::Error>>(), &mut conn).await?;
//! assert_eq!(n, 0);
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;
#[cfg(feature = "tokio")]
mod io;

// Protocol
pub mod postgres;

// Operation
pub mod transport;
pub mod executor;
pub mod copy;

// Connection
pub mod config;
#[cfg(feature = "tokio")]
pub mod stream;

mod error;


pub use executor::Executor;
pub use transport::{PgTransport, PgTransportExt};
pub use config::Config;
#[cfg(feature = "tokio")]
pub use stream::PgStream;
#[doc(inline)]
pub use copy::{copy_in, CopyIn};
pub use error::{Error, ErrorKind, Result};
