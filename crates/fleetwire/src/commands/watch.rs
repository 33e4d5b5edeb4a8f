//! `watch`: stream realtime notifications of a collection.

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use fleetwire_core::{CoreError, EventKind, Notification, Resource, Session, compile};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(session: &Session, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resource = Resource::from(args.resource);
    let kinds: Vec<EventKind> = if args.kinds.is_empty() {
        EventKind::all().collect()
    } else {
        args.kinds
            .iter()
            .map(|kind| kind.parse())
            .collect::<Result<_, CoreError>>()?
    };
    let filter = util::filter_spec(&args.filter, resource)?.map(|(filter, maps)| compile(filter, maps));
    let channel = util::channel_for(resource, args.channel);
    let subscriber = format!("watch-{}", std::process::id());

    let multiplexer = session.multiplexer();
    let (tx, mut notifications) = mpsc::unbounded_channel::<Notification>();
    for kind in kinds {
        let tx = tx.clone();
        multiplexer.add_listener(&subscriber, &channel, kind, move |notification| {
            let _ = tx.send(notification.clone());
        })?;
    }
    drop(tx);

    let mut signals = multiplexer.signals();
    let mut status = multiplexer.start(&subscriber, &channel)?;
    let mut subscribed = false;
    let mut seen = 0usize;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        if args.limit.is_some_and(|limit| seen >= limit) {
            break Ok(());
        }

        tokio::select! {
            biased;

            _ = &mut ctrl_c => {
                debug!("interrupted");
                break Ok(());
            }

            received = signals.recv() => match super::on_signal(received) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            },

            ready = status.subscribed(), if !subscribed => {
                if let Err(e) = ready {
                    break Err(e.into());
                }
                subscribed = true;
                info!(%channel, "subscribed");
            }

            Some(notification) = notifications.recv() => {
                if filter.as_ref().is_some_and(|f| !f.matches(&notification.data)) {
                    continue;
                }
                seen += 1;
                output::print_output(&render(global.output, &notification), global.quiet);
            }
        }
    };

    multiplexer.remove_subscriber(&subscriber, &channel);
    result
}

fn render(format: OutputFormat, notification: &Notification) -> String {
    match format {
        OutputFormat::Plain => format!(
            "{} {} {}",
            notification.kind, notification.channel, notification.data
        ),
        _ => json!({
            "channel": notification.channel,
            "kind": notification.kind.to_string(),
            "data": notification.data,
        })
        .to_string(),
    }
}
