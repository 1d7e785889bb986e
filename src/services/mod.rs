pub mod chain;
pub mod redis_store;
pub mod store;
pub mod verifier;

pub use chain::{ChainClient, ChainService};
pub use redis_store::RedisStore;
pub use store::{MemoryStore, PaymentStore};
pub use verifier::{PaymentVerifier, VerifierSettings};
