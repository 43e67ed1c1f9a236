//! Local tools the agent can offer to the model
pub mod open_file;

pub use open_file::{FileOpener, OpenFileTool, SystemOpener};
