//! Command dispatch: bridges CLI args -> core session -> output formatting.

pub mod config_cmd;
pub mod count;
pub mod util;
pub mod watch;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use fleetwire_core::{ConnectionSignal, Session};

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a platform-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Count(args) => count::handle(session, args, global).await,
        Command::Watch(args) => watch::handle(session, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// React to a connection signal while streaming: transient connect
/// failures are logged, rejected sessions and subscriptions end the
/// command. `Ok(false)` means the signal stream has closed.
pub(crate) fn on_signal(
    received: Result<ConnectionSignal, RecvError>,
) -> Result<bool, CliError> {
    match received {
        Ok(ConnectionSignal::Connected) => info!("realtime connected"),
        Ok(ConnectionSignal::ConnectFailed { code }) => {
            warn!(code, "realtime connect failed, transport retrying");
        }
        Ok(ConnectionSignal::HandshakeFailed { reason }) => {
            return Err(CliError::Realtime { reason });
        }
        Ok(ConnectionSignal::SubscribeFailed { channel, reason }) => {
            return Err(CliError::Realtime {
                reason: format!("{channel}: {reason}"),
            });
        }
        Err(RecvError::Lagged(skipped)) => warn!(skipped, "connection signals lagged"),
        Err(RecvError::Closed) => return Ok(false),
    }
    Ok(true)
}
