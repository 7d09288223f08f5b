//! Client-facing Debug Adapter Protocol plumbing.
//!
//! The client talks to the bridge over stdin/stdout using `Content-Length`
//! framed JSON. This module owns the framing and the two stream tasks:
//! - `codec`: [`DapCodec`](codec::DapCodec) frame encoder/decoder.
//! - `protocol`: envelopes and the bodies the bridge fabricates.
//! - `reader`: decodes client requests into session inputs.
//! - `writer`: stamps sequence numbers and writes outbound messages.

pub mod codec;
pub mod protocol;
pub mod reader;
pub mod writer;
