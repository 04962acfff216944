pub mod category;
pub mod permission;
pub mod post;
pub mod session;
pub mod tag;
pub mod user;
pub mod view;
