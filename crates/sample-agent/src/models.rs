//! These models represent the objects passed around by the agent
//!
//! Messages flow between three parties: the HTTP client that starts a turn, the
//! chat-completions endpoint that decides what to do next, and the tools that
//! carry out requested calls. Each of those speaks its own wire format; we always
//! convert into these internal structs at the boundary, so the internal models
//! are deliberately not an exact match for any of them.
pub mod message;
pub mod role;
pub mod tool;
