pub mod errors;

pub use errors::EngineError;
