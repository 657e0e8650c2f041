pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use error::{CastError, Result};
pub use registry::ClientRegistry;
pub use server::{Server, ServerConfig};
