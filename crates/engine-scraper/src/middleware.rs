//! Spider-middleware chain (spec.md §4.5): wraps parser invocation with
//! input/output/exception hooks, symmetric to the downloader-middleware
//! chain but keyed on the response/output pair instead of request/response.

use engine_protocol::error::ScraperError;
use engine_protocol::response::Response;

use crate::parser::ParseOutput;

pub trait SpiderMiddleware: Send + Sync {
    /// Called before the parser runs. Returning `Err` aborts the parse and
    /// routes straight to `process_spider_exception`.
    fn process_spider_input(&self, response: &Response) -> Result<(), ScraperError> {
        let _ = response;
        Ok(())
    }

    /// Called with the parser's full output batch; may filter, tag, or
    /// append to it.
    fn process_spider_output(&self, response: &Response, outputs: Vec<ParseOutput>) -> Vec<ParseOutput> {
        let _ = response;
        outputs
    }

    /// Called when the parser (or an earlier `process_spider_input`) raised
    /// an error. Returning `Some` substitutes a recovery output batch;
    /// `None` lets the exception propagate to the next middleware, or to
    /// the request's `errback` if this was the last one.
    fn process_spider_exception(&self, response: &Response, error: &ScraperError) -> Option<Vec<ParseOutput>> {
        let _ = (response, error);
        None
    }
}

/// An ordered chain, applied outside-in on input and inside-out on output,
/// mirroring `crate::downloader`'s `MiddlewareChain` shape.
#[derive(Default)]
pub struct SpiderMiddlewareChain {
    middlewares: Vec<Box<dyn SpiderMiddleware>>,
}

impl SpiderMiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    pub fn push(&mut self, middleware: Box<dyn SpiderMiddleware>) {
        self.middlewares.push(middleware);
    }

    pub fn process_input(&self, response: &Response) -> Result<(), ScraperError> {
        for middleware in &self.middlewares {
            middleware.process_spider_input(response)?;
        }
        Ok(())
    }

    pub fn process_output(&self, response: &Response, mut outputs: Vec<ParseOutput>) -> Vec<ParseOutput> {
        for middleware in self.middlewares.iter().rev() {
            outputs = middleware.process_spider_output(response, outputs);
        }
        outputs
    }

    /// Returns `Some(outputs)` if some middleware recovered; `None` if the
    /// exception fell through the whole chain unhandled.
    pub fn process_exception(&self, response: &Response, error: &ScraperError) -> Option<Vec<ParseOutput>> {
        for middleware in self.middlewares.iter().rev() {
            if let Some(outputs) = middleware.process_spider_exception(response, error) {
                return Some(outputs);
            }
        }
        None
    }
}
