//! vigil-reporters — sinks for statuses emitted by a `vigil_core::Checker`.
//!
//! | Reporter | Output |
//! |---|---|
//! | [`WriterReporter`] | one JSON line per status on any `io::Write` |
//! | [`TracingReporter`] | a `tracing` event per status |
//! | [`HttpReporter`] | latest status served as JSON over HTTP |
//! | [`GrpcHealthReporter`] | SERVING / NOT_SERVING on a gRPC health service |

pub mod grpc;
pub mod logging;
pub mod server;
pub mod writer;

pub use crate::grpc::GrpcHealthReporter;
pub use crate::logging::TracingReporter;
pub use crate::server::HttpReporter;
pub use crate::writer::WriterReporter;
