//! Operator notifications.

mod console;
mod webhook;

pub use console::ConsoleNotifier;
pub use webhook::WebhookNotifier;
