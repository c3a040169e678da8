/// Produces the reply sent back for each inbound message.
pub trait Responder: Send + Sync {
    fn respond(&self, message: &str) -> String;
}

/// Replies with the inbound text prefixed by `"Received: "`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoResponder;

pub const ECHO_PREFIX: &str = "Received: ";

impl Responder for EchoResponder {
    fn respond(&self, message: &str) -> String {
        format!("{ECHO_PREFIX}{message}")
    }
}

impl<F> Responder for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn respond(&self, message: &str) -> String {
        self(message)
    }
}
