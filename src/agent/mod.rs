//! The agent: model replies in, page actions out.

pub mod cdp;
pub mod chat;
pub mod dispatcher;
pub mod llm;
pub mod outcome;
pub mod page;
pub mod parser;
pub mod types;

pub use cdp::{CdpBrowser, CdpPage};
pub use chat::{ChatSession, TurnReply};
pub use dispatcher::Dispatcher;
pub use outcome::{narrate, narrate_start, ActionOutcome, OutcomeDetail, OutcomeStatus};
pub use page::{PageContext, PageHandle};
pub use parser::{parse, ParsedReply};
pub use types::*;
