pub mod analysis;
pub mod events;
pub mod shell;
pub mod synthesis;

pub use shell::{App, Session};
