// =============================================================================
// Remote Inference Module
// =============================================================================
//
// Request assembly, the HTTP client for an OpenAI-compatible endpoint, strict
// reply parsing and the invoker that bounds every call in time and
// concurrency.

pub mod client;
pub mod invoker;
pub mod reply;
pub mod request;

#[cfg(test)]
pub mod testing;

pub use client::HttpInferenceClient;
pub use invoker::{RemoteInvoker, RetryPolicy};
pub use request::InferenceRequest;
