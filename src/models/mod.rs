mod cache;
mod channel;
mod stream;

pub use cache::*;
pub use channel::*;
pub use stream::*;
