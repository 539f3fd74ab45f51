pub mod analyze;
pub mod check_model;
pub mod image;
pub mod set_token;
