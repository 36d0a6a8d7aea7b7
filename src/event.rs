use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Application events
#[derive(Debug)]
pub enum Event {
  /// Terminal key press
  Key(KeyEvent),
  /// Terminal was resized
  Resize,
  /// Periodic tick for UI refresh
  Tick,
  /// The grid published a new snapshot
  GridChanged,
}

/// Event handler that produces events from terminal input, a tick timer and
/// grid snapshot changes
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // crossterm's poll blocks, so the reader gets its own thread
    let input_tx = tx.clone();
    tokio::task::spawn_blocking(move || loop {
      let event = if event::poll(tick_rate).unwrap_or(false) {
        match event::read() {
          Ok(CrosstermEvent::Key(key)) => Event::Key(key),
          Ok(CrosstermEvent::Resize(_, _)) => Event::Resize,
          _ => continue,
        }
      } else {
        Event::Tick
      };
      if input_tx.send(event).is_err() {
        break;
      }
    });

    Self { tx, rx }
  }

  /// Forward every change on `changes` as `Event::GridChanged`.
  pub fn forward_changes<T: Send + Sync + 'static>(&self, mut changes: watch::Receiver<T>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      while changes.changed().await.is_ok() {
        if tx.send(Event::GridChanged).is_err() {
          break;
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_forward_changes() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut handler = EventHandler { tx, rx };

    let (watch_tx, watch_rx) = watch::channel(0u32);
    handler.forward_changes(watch_rx);
    watch_tx.send_replace(1);

    let event = tokio::time::timeout(Duration::from_secs(2), handler.next())
      .await
      .unwrap();
    assert!(matches!(event, Some(Event::GridChanged)));
  }
}
