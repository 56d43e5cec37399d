/*!
 * Monitoring
 * Tracing subscriber setup and process spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, span_process, ProcessSpan};
