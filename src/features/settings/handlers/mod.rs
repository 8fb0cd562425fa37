mod settings_handler;

pub use settings_handler::*;
