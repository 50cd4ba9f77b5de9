//! Output collaborators: where messages and status lines end up.

use crate::model::Message;

/// Sink for everything the client shows to the user.
///
/// Implementations are pure output; nothing in this crate reads back from them.
pub trait MessagePrinter: Send + Sync {
    fn print_message(&self, message: &Message);

    fn print_status(&self, status: &str);
}

/// Uncolored printer writing one line per message to stdout.
#[derive(Debug, Clone, Default)]
pub struct ConsolePrinter {
    with_metadata: bool,
}

impl ConsolePrinter {
    pub fn new(with_metadata: bool) -> Self {
        Self { with_metadata }
    }

    pub fn format_message(&self, message: &Message) -> String {
        let date = message
            .date_time()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| message.timestamp.to_string());

        let mut line = format!(
            "{} {} {} {} {} {}",
            message.host, date, message.facility, message.severity, message.app, message.message
        );

        if self.with_metadata {
            for (key, values) in &message.metadata {
                line.push_str(&format!(" {key}:{}", values.join(",")));
            }
        }

        line
    }
}

impl MessagePrinter for ConsolePrinter {
    fn print_message(&self, message: &Message) {
        println!("{}", self.format_message(message));
    }

    fn print_status(&self, status: &str) {
        println!("{status}");
    }
}
