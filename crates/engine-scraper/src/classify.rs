//! Output classification and depth tracking (spec.md §4.5: "a Request goes
//! to the scheduler; an Item goes sequentially through the item pipeline;
//! ... if `DEPTH_LIMIT > 0` and the child would exceed it, drop with a
//! stats counter").

use engine_protocol::item::Item;
use engine_protocol::request::Request;

use crate::parser::ParseOutput;

#[derive(Debug, Default)]
pub struct ClassifiedOutputs {
    pub requests: Vec<Request>,
    pub items: Vec<Item>,
    pub depth_dropped: u64,
}

/// Splits a parser's raw output batch into requests (admitted past
/// `DEPTH_LIMIT`) and items. `depth_limit == 0` means unlimited, matching
/// spec.md §6.
pub fn classify(outputs: Vec<ParseOutput>, depth_limit: u32) -> ClassifiedOutputs {
    let mut classified = ClassifiedOutputs::default();
    for output in outputs {
        match output {
            ParseOutput::Item(item) => classified.items.push(item),
            ParseOutput::Request(request) => {
                if depth_limit > 0 && request.meta.depth > depth_limit {
                    tracing::debug!(
                        url = %request.url,
                        depth = request.meta.depth,
                        depth_limit,
                        "dropping request past DEPTH_LIMIT"
                    );
                    classified.depth_dropped += 1;
                } else {
                    classified.requests.push(request);
                }
            }
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn request_at_depth(depth: u32) -> Request {
        let mut request = Request::new(url::Url::parse("https://example.com/").unwrap(), 0).build();
        request.meta.depth = depth;
        request
    }

    #[test]
    fn requests_beyond_depth_limit_are_dropped_and_counted() {
        let outputs = vec![
            ParseOutput::Request(request_at_depth(1)),
            ParseOutput::Request(request_at_depth(3)),
            ParseOutput::Item(Item::from_raw_fields(HashMap::new())),
        ];
        let classified = classify(outputs, 2);
        assert_eq!(classified.requests.len(), 1);
        assert_eq!(classified.items.len(), 1);
        assert_eq!(classified.depth_dropped, 1);
    }

    #[test]
    fn zero_depth_limit_means_unlimited() {
        let outputs = vec![ParseOutput::Request(request_at_depth(999))];
        let classified = classify(outputs, 0);
        assert_eq!(classified.requests.len(), 1);
        assert_eq!(classified.depth_dropped, 0);
    }
}
