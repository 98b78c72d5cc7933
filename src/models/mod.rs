pub mod token;

pub use token::{DiscoveredToken, TokenPayload, TokenSnapshot};
