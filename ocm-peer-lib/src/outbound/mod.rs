pub mod client;
pub mod error;
pub mod intent;
pub mod redirect;
pub mod resolver;

pub use client::{JsonResponse, SafeClient};
pub use error::{find_outbound_error, OutboundError, OutboundErrorKind};
pub use intent::RequestIntent;
pub use resolver::{resolve_cancellable, vet_host, LookupFuture, Resolver, SystemResolver};
