pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ReflexConfig;
pub use error::{ReflexError, Result};
pub use traits::{
    DmSender, HttpClient, HttpRequest, HttpResponse, MessageComposer, PromptContext, ReplyPoster,
    RuleStore,
};
pub use types::*;
