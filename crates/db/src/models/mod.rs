pub mod notification;
pub mod timestamp;

pub use notification::*;
pub use timestamp::*;
