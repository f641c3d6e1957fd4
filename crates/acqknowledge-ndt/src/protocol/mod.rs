//! AcqKnowledge control protocol modules.
//!
//! The control endpoint speaks XML-RPC over HTTP:
//! - [`xmlrpc`]: value model, request encoding, and response/fault decoding.
//! - [`constants`]: vendor method names, default ports, and OSC defaults.

pub mod constants;
pub mod xmlrpc;
