mod services;
mod session_binding;
mod user_file;

pub use services::Services;
pub use session_binding::SessionBindings;
pub use user_file::load_user_file;
