pub mod config;
pub mod dimse;
pub mod observability;
pub mod registry;
pub mod server;
pub mod transport;

pub use config::{AppConfig, LoggingConfig, NetworkConfig, StatusConfig, WorklistSettings};
pub use dimse::{
    CFindRq, CFindRsp, CommandHandler, CommandOutcome, DataSetType, DimseError, DimseMessage,
    PresentationContext, Priority,
};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use registry::{Registry, ServerHandle};
pub use server::{ServerError, WorklistServer};
pub use transport::{
    AssociationSender, AssociationTransport, ChannelTransport, NetworkSettings, TransportError,
};
