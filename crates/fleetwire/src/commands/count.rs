//! `count`: snapshot count of a collection, optionally followed live.

use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use fleetwire_core::{ConnectionSignal, Resource, Session};

use crate::cli::{CountArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(session: &Session, args: CountArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let resource = Resource::from(args.resource);
    let filter = util::filter_spec(&args.filter, resource)?;

    if filter.is_some() && !args.query.is_empty() {
        return Err(CliError::Validation {
            field: "query".into(),
            reason: "--query applies to plain counting; use --filter with filters".into(),
        });
    }
    if args.items && filter.is_none() {
        return Err(CliError::Validation {
            field: "items".into(),
            reason: "--items needs at least one filter flag".into(),
        });
    }

    let query = util::parse_pairs(&args.query, "query")?;
    let channel = util::channel_for(resource, args.channel);
    let counter = session.counter_on(resource, channel, query);
    if let Some((filter, maps)) = filter {
        counter.filter(filter, maps)?;
    }

    let (tx, mut changes) = mpsc::unbounded_channel();
    counter.on_change(move |new, old| {
        let _ = tx.send((new, old));
    });
    let mut signals = session.multiplexer().signals();

    counter.start().await?;
    let items = args.items.then(|| counter.items());
    output::print_output(
        &output::render_count(global.output, counter.count(), items.as_deref()),
        global.quiet,
    );

    let result = if args.follow {
        follow(&mut changes, &mut signals, global).await
    } else {
        Ok(())
    };
    counter.stop()?;
    result
}

async fn follow(
    changes: &mut mpsc::UnboundedReceiver<(usize, usize)>,
    signals: &mut broadcast::Receiver<ConnectionSignal>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            biased;

            _ = &mut ctrl_c => {
                debug!("interrupted");
                return Ok(());
            }

            received = signals.recv() => {
                if !super::on_signal(received)? {
                    return Ok(());
                }
            }

            Some((new, old)) = changes.recv() => {
                output::print_output(
                    &output::render_change(global.output, new, old, color),
                    global.quiet,
                );
            }
        }
    }
}
