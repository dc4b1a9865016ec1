pub mod http;

pub use http::{to_sink_documents, HttpDocumentSink};
