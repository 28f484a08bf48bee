//! FoodHunter: restaurant trend reports built from web search results and a
//! hosted chat model.
//!
//! The flow for one request is linear: resolve credentials, build a search
//! query, fetch evidence, render the persona prompt, call the completion
//! endpoint, clean the output. [`pipeline::ReportPipeline`] owns that flow;
//! the web server and the terminal chat are thin surfaces over it.

pub mod chat;
pub mod completion;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod prompt;
pub mod query;
pub mod sanitize;
pub mod search;
pub mod transcript;
pub mod web_server;

pub use completion::Provider;
pub use credentials::{Credentials, SecretStore};
pub use error::{ReportError, Result};
pub use pipeline::{Report, ReportEvent, ReportPipeline, Settings};
pub use prompt::OutputFormat;
pub use transcript::{Role, Transcript, Turn};
