//! Startup message relay

use crate::protocol::{encode_message, FrontendMessage, StartupParameters};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Write the client's startup message as the first application bytes.
///
/// Flushes so that a TLS session actually puts the record on the wire.
pub(crate) async fn relay_startup<W>(stream: &mut W, params: &StartupParameters) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let startup = encode_message(&FrontendMessage::Startup(params));
    stream.write_all(&startup).await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_relay_writes_encoded_parameters() {
        let params = StartupParameters::builder()
            .user("root")
            .database("defaultdb")
            .build()
            .unwrap();
        let expected = params.encode();

        let mut mock = Builder::new().write(&expected).build();
        relay_startup(&mut mock, &params).await.unwrap();
    }

    #[tokio::test]
    async fn test_relay_write_error() {
        let params = StartupParameters::builder().user("root").build().unwrap();
        let mut mock = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let err = relay_startup(&mut mock, &params).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }
}
