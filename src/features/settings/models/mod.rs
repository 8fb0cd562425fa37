mod settings;

pub use settings::{AllForms, EnabledForms, Settings};
