mod event;
mod session;

pub use event::*;
pub use session::*;
