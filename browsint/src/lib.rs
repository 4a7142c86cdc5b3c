// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{decision_from_answer, initialize, mode_from_arg, parse_url_line};
