pub mod agent;
pub mod checkpoint;
pub mod errors;
pub mod gateway;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod registry;
pub mod session;
pub mod store;
pub mod tools;
