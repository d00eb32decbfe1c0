pub mod archive;
pub mod batch;
pub mod config;
pub mod metrics;
pub mod sink;
pub mod source;
pub mod testing;
pub mod transformer;

pub use archive::{ArchiveConfig, ArchiveEncoder, ArchiveError, CompressionMethod, EntryHandle};
pub use batch::{
    AbortReason, AutoConfirm, BatchConfig, BatchError, BatchEvent, BatchJob, BatchOrchestrator,
    BatchState, BatchSummary, ConfirmationGate, ErrorLedger, ItemStatus, LimitGate,
    ProgressState, RequestConfirmation, RunContext,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
    ServerConfig, SourceConfig,
};
pub use sink::{ArchiveSink, ArchiveStream, ChannelSink, FileSink, SinkConfig, SinkError, SinkReport};
pub use source::{BatchItem, DirectorySource, ItemDescriptor, ItemSource, MemorySource, Preflight, SourceError};
pub use transformer::{
    create_transformer, CommandConfig, CommandTransformer, PassthroughTransformer,
    TransformOutcome, Transformer, TransformerBackend, TransformerConfig, TransformerError,
    TransformerGateway,
};
