mod admin_page_handler;

pub use admin_page_handler::*;
