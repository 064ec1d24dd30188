//! Hardware edge source: GPIO character device via tokio-gpiod
//!
//! Requests every registered line on one chip with both-edge detection and
//! pull-up bias (switch and encoder commons go to ground), then forwards
//! kernel-timestamped edges through the dispatcher into the event channel.
//! Opening and requesting happen before the loop starts, so a bad device or
//! busy line is a startup error; the wait itself is cancelled by the
//! shutdown signal, so termination does not depend on a further edge ever
//! arriving.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tokio_gpiod::{Bias, Chip, EdgeDetect, Input, Lines, Options};
use tracing::{debug, info};

use super::{Dispatcher, Edge, InputEvent, RawEdge};

const CONSUMER: &str = "knobd";

pub struct EdgeSource {
    inputs: Lines<Input>,
}

impl EdgeSource {
    /// Open the chip and request all registered lines.
    pub async fn open(device: &str, lines: &[u32]) -> Result<Self> {
        let chip = Chip::new(device)
            .await
            .with_context(|| format!("opening GPIO device '{device}'"))?;
        let opts = Options::input(lines)
            .edge(EdgeDetect::Both)
            .bias(Bias::PullUp)
            .consumer(CONSUMER);
        let inputs = chip
            .request_lines(opts)
            .await
            .with_context(|| format!("requesting lines {lines:?} on '{device}'"))?;
        info!(device, ?lines, "GPIO lines requested");
        Ok(Self { inputs })
    }

    /// Read edges until shutdown or until the event channel closes.
    ///
    /// Owns the `Dispatcher` for the lifetime of the loop: all debounce and
    /// quadrature state mutation happens here, sequentially.
    pub async fn run(
        mut self,
        mut dispatcher: Dispatcher,
        events: mpsc::Sender<InputEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                event = self.inputs.read_event() => {
                    let event = event.context("reading GPIO edge event")?;
                    let raw = RawEdge {
                        line: event.line as u32,
                        edge: match event.edge {
                            tokio_gpiod::Edge::Rising => Edge::Rising,
                            tokio_gpiod::Edge::Falling => Edge::Falling,
                        },
                        at: event.time,
                    };
                    if let Some(input) = dispatcher.handle_edge(raw) {
                        debug!(?input, "input event");
                        if events.send(input).await.is_err() {
                            // Engine loop is gone; nothing left to deliver to.
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("GPIO loop stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}
