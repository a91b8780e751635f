pub mod event;
pub mod poll;
pub mod session;
pub mod tally;
pub mod vote;

pub use event::{ClientEvent, ServerEventKind};
pub use poll::{Poll, PollOption, PollStatus};
pub use session::StudentSession;
pub use tally::VoteTally;
pub use vote::Vote;
