use std::{io::Write, time::Duration};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    rolling::{Applied, RollingSampleBuffer, RollingWindow},
    stream::{ConnectionState, Connector, StreamSubscription, SubscribeOptions, Update},
};

const LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Live CPU/RAM charts. Owns the subscription and both windows for as long as
/// the view is mounted; dropping it closes the stream.
pub struct MonitorView<C: Connector> {
    subscription: StreamSubscription<C>,
    buffer: RollingSampleBuffer,
}

impl<C: Connector> MonitorView<C> {
    pub fn mount(connector: C, url: impl Into<String>, options: SubscribeOptions) -> Self {
        Self {
            subscription: StreamSubscription::open(connector, url, options),
            buffer: RollingSampleBuffer::default(),
        }
    }

    #[cfg(test)]
    pub fn subscription(&self) -> &StreamSubscription<C> {
        &self.subscription
    }

    #[cfg(test)]
    pub fn buffer(&self) -> &RollingSampleBuffer {
        &self.buffer
    }

    /// Folds the latest payload into the windows after a data update.
    pub fn apply(&mut self, update: Update) -> Applied {
        match (update, self.subscription.data()) {
            (Update::Data, Some(payload)) => self.buffer.push_payload(payload),
            _ => Applied::default(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}\n{}{}",
            status_line(self.subscription.state(), self.subscription.url()),
            render_chart("CPU Monitor", self.buffer.cpu()),
            render_chart("RAM Monitor", self.buffer.ram())
        )
    }

    /// Drives the view until `shutdown` fires. A transport failure ends the
    /// view with an error unless `retry` is set, in which case the view waits
    /// that long and asks the subscription to reconnect.
    pub async fn run(
        &mut self,
        out: &mut impl Write,
        retry: Option<Duration>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.render())?;

        loop {
            let update = tokio::select! {
                _ = shutdown.cancelled() => break,
                update = self.subscription.next_update() => update,
            };

            match update {
                Some(Update::Opened) => {
                    writeln!(out, "connected to {}", self.subscription.url())?;
                }
                Some(update @ Update::Data) => {
                    let applied = self.apply(update);
                    if applied.cpu || applied.ram {
                        writeln!(out, "{}", self.render())?;
                    }
                }
                Some(Update::Failed) | None => {
                    let reason = self
                        .subscription
                        .error()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "stream ended".to_owned());
                    let Some(interval) = retry else {
                        anyhow::bail!("{reason}");
                    };

                    writeln!(
                        out,
                        "disconnected: {reason}; retrying in {}s",
                        interval.as_secs_f32()
                    )?;
                    warn!("monitor stream lost, reconnecting in {interval:?}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(interval) => self.subscription.reconnect(),
                    }
                }
            }
        }

        if self.subscription.is_connected() {
            info!("closing live stream {}", self.subscription.url());
        }
        info!("monitor view unmounted");
        self.subscription.close();
        Ok(())
    }
}

fn status_line(state: ConnectionState, url: &str) -> String {
    let status = match state {
        ConnectionState::Connecting => "connecting",
        ConnectionState::Open => "live",
        ConnectionState::Error => "disconnected",
        ConnectionState::Closed => "closed",
    };
    format!("[{status}] {url}")
}

fn render_chart(title: &str, window: &RollingWindow) -> String {
    let latest = match window.latest() {
        Some(point) => format!("{:.1}%  ({})", point.value, point.time),
        None => "waiting for data".to_owned(),
    };
    let line: String = window
        .iter()
        .map(|point| {
            if point.is_placeholder() {
                ' '
            } else {
                level(point.value)
            }
        })
        .collect();
    let first = window
        .iter()
        .find(|p| !p.is_placeholder())
        .map(|p| p.time.as_str())
        .unwrap_or_default();

    format!("{title}  {latest}\n|{line}| 100%\n {first}\n")
}

fn level(percent: f64) -> char {
    let ratio = percent.clamp(0.0, 100.0) / 100.0;
    LEVELS[(ratio * (LEVELS.len() - 1) as f64).round() as usize]
}
