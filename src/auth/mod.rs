pub mod magic;
pub mod role;
pub mod session;
pub mod user;

pub use magic::*;
pub use role::*;
pub use session::*;
pub use user::*;
