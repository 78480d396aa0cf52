pub mod base;
pub mod http;

pub use base::{ChatTurn, ReplyConfig, ReplyError, ReplyService};
pub use http::HttpReplyService;
