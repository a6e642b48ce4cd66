//! # Handler chain
//!
//! Ordered middleware pipelines. The bot runs one chain over inbound messages, one over outbound
//! messages, and one over each session before routing. A stage can stop the chain; the engine only
//! runs when every stage returned [`Flow::Continue`].

use std::sync::Arc;

use dbot_core::{Flow, Middleware, Result};
use tracing::{debug, info, instrument, warn};

/// Middleware pipeline over `T`: stages run in registration order.
pub struct MiddlewareChain<T: Send> {
    middleware: Vec<Arc<dyn Middleware<T>>>,
}

impl<T: Send> Clone for MiddlewareChain<T> {
    fn clone(&self) -> Self {
        Self {
            middleware: self.middleware.clone(),
        }
    }
}

impl<T: Send> Default for MiddlewareChain<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> MiddlewareChain<T> {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    /// Appends a stage (builder form).
    pub fn add_middleware(mut self, middleware: Arc<dyn Middleware<T>>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Appends a stage in place.
    pub fn push(&mut self, middleware: Arc<dyn Middleware<T>>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs every stage in order. The first `Stop` or error ends the chain.
    #[instrument(skip(self, target), fields(stages = self.middleware.len()))]
    pub async fn run(&self, target: &mut T) -> Result<Flow> {
        for mw in &self.middleware {
            let mw_name = mw.name().to_string();
            debug!(middleware = %mw_name, "step: middleware");
            match mw.handle(target).await? {
                Flow::Continue => {
                    debug!(middleware = %mw_name, "step: middleware done");
                }
                Flow::Stop => {
                    info!(middleware = %mw_name, "step: middleware stopped chain");
                    return Ok(Flow::Stop);
                }
            }
        }
        Ok(Flow::Continue)
    }

    /// Like [`MiddlewareChain::run`], but a failing stage is logged and skipped.
    pub async fn run_tolerant(&self, target: &mut T) -> Flow {
        for mw in &self.middleware {
            match mw.handle(target).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => {
                    info!(middleware = %mw.name(), "step: middleware stopped chain");
                    return Flow::Stop;
                }
                Err(e) => {
                    warn!(middleware = %mw.name(), error = %e, "middleware failed; continuing");
                }
            }
        }
        Flow::Continue
    }
}

// Unit/integration tests live in tests/handler_chain_test.rs
