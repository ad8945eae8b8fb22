pub mod analysis;
pub mod codec;
pub mod dispatch;
pub mod shared;
