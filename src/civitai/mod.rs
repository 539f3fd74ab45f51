//! Civitai private tRPC API: the image records the analysis runs on.

pub mod auth;
pub mod error;
pub mod factory;
pub mod records;
pub mod source;
pub mod trpc;

pub use error::CivitaiError;
pub use factory::create_source;
pub use records::{ImageRecord, LoraUsage};
pub use source::{FetchLimit, ImageSource, MockImageSource, ModelAvailability};
pub use trpc::TrpcClient;
