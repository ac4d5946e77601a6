//! The contract of the transport layer.
//!
//! Establishing connections, selecting the primary and framing messages
//! are the transport's business. Everything above it only needs a
//! thread-safe request/response channel.

use std::fmt::Debug;
use async_trait::async_trait;
use crate::{
    wire::{ Request, Response },
    error::Result,
};

/// A shared, internally synchronized channel to a server.
#[async_trait]
pub trait Connection: Debug + Send + Sync {
    /// Performs exactly one round trip, without retrying.
    ///
    /// If `request.acknowledge` is set, the transport follows the operation
    /// with the corresponding `getlasterror` command on the same socket and
    /// answers with the reply to that command.
    ///
    /// Failing to obtain any reply must be reported as an error of kind
    /// [`ErrorKind::Transport`](../error/enum.ErrorKind.html).
    async fn submit(&self, request: Request) -> Result<Response>;

    /// Hands the request to the transport and returns immediately.
    /// There is no reply.
    fn send(&self, request: Request) -> Result<()>;
}
