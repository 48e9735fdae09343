//! Newsletter Digest: mailbox newsletters in, ranked article records and a
//! daily digest page out.

pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod mailbox;
pub mod normalize;
pub mod pipeline;
pub mod sink;
