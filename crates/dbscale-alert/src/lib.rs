//! dbscale-alert — alert delivery off the control loop's hot path.
//!
//! The control loop hands alerts to an `AlertDispatcher`, which only
//! enqueues them. A background task drains the queue and delivers each
//! alert to every configured channel.
//!
//! ```text
//! AlertSink::notify()  ──try_send──▶  bounded queue  ──▶  worker task
//!                                                          ├── LogChannel
//!                                                          ├── WebhookChannel (JSON POST)
//!                                                          └── SlackChannel   (incoming webhook)
//! ```

pub mod channel;
pub mod dispatcher;

pub use channel::{AlertChannel, DeliveryError, LogChannel, SlackChannel, WebhookChannel};
pub use dispatcher::AlertDispatcher;
