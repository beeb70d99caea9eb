pub mod block_assembler;
pub mod bundle;
pub mod bundle_store;
pub mod config;
pub mod publisher;
pub mod ranking;
pub mod relay;
pub mod rpc;
pub mod server;
pub mod simulator;

#[cfg(test)]
mod property_tests;

// Re-export commonly used types
pub use block_assembler::{block_hash, AssemblyError, BlockAssembler, BuildResult};
pub use bundle::{Bundle, BundleError};
pub use bundle_store::{BundleStore, StoreError, StoreStats};
pub use publisher::{LogPublisher, PublishError, RedisPublisher, ResultPublisher};
pub use ranking::rank_bundles;
pub use relay::{BuilderClient, HttpBuilderClient, RelayError, RelayGateway};
pub use simulator::{
    BundleSimulator, DeterministicExecutionModel, ExecutionModel, RemoteSimulator,
    SimulationClient, SimulationError, SimulationOutcome,
};
