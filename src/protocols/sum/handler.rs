//! Summing protocol connection handler.

use super::parser::{self, Session, Tag};
use crate::connection::{timed, write_response, SessionSettings};
use crate::error::ServerError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, info};

/// Handle a single summing session.
///
/// Sends the greeting, reads tagged values until the `0` tag or the first
/// violation, then sends exactly one `OK` or `ERROR` response. Nothing more is
/// read after a violation. A read failure anywhere abandons the session.
pub async fn handle_connection<R, W>(
    reader: &mut R,
    writer: &mut W,
    settings: &SessionSettings,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    write_response(writer, &parser::greeting(&settings.identity.id)?).await?;
    let mut session = Session::new();
    debug!(id = %settings.identity.id, state = ?session.state(), "Sent greeting");

    let limit = settings.read_timeout;

    let outcome = loop {
        let raw = timed(limit, reader.read_i32()).await?;
        let value = match session.next_tag(raw) {
            Ok(Tag::End) => break session.finish(),
            Ok(Tag::Int) => f64::from(timed(limit, reader.read_i32()).await?),
            Ok(Tag::Double) => timed(limit, reader.read_f64()).await?,
            Err(violation) => break Err(violation),
        };
        if let Err(violation) = session.accept(value) {
            break Err(violation);
        }
    };

    match outcome {
        Ok(sum) => {
            write_response(writer, &parser::response_ok(sum)).await?;
            info!(sum, count = session.count(), "Sent OK response");
        }
        Err(violation) => {
            write_response(writer, &parser::response_error(&violation)?).await?;
            info!(%violation, count = session.count(), sum = session.sum(), "Sent error response");
        }
    }
    debug!(state = ?session.state(), "Session finished");

    Ok(())
}
