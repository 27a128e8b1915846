pub mod availability;
pub mod dispatch;
pub mod lifecycle;
pub mod validator;
