pub mod app;

pub use app::client::{EksClient, Namespace, Options};
pub use app::error::Error;
pub use app::token::{Token, TokenCache, TokenGenerator, TokenSource};
pub use app::transport::{HttpsTransport, TokenTransport, Transport};
