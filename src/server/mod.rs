mod client;
mod handlers;
mod state;

pub use client::render_popup_html;
pub use handlers::{router, run_server};
