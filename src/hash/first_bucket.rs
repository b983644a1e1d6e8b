//! Baseline selector that always takes the first usable bucket.

use super::{HashFunction, RouterOptions};
use crate::error::RoutingError;
use crate::topology::{Bucket, GraphPathElement};

#[derive(Debug, Clone, Default)]
pub struct FirstBucketHashFunction {
    options: RouterOptions,
}

impl FirstBucketHashFunction {
    pub fn new(options: RouterOptions) -> Self {
        Self { options }
    }
}

impl HashFunction for FirstBucketHashFunction {
    fn choose_nexthop(&mut self, buckets: &[Bucket], _flow_id: &str) -> Result<GraphPathElement, RoutingError> {
        buckets
            .iter()
            .find(|bucket| bucket.weight > 0.0)
            .map(|bucket| bucket.edge.clone())
            .ok_or_else(|| RoutingError::NoEligibleNexthop {
                node: buckets.first().map(|bucket| bucket.edge.from.clone()).unwrap_or_default(),
            })
    }

    fn options(&self) -> &RouterOptions {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_zero_weight_buckets() {
        let mut hash_fn = FirstBucketHashFunction::default();
        let buckets = vec![
            Bucket::new(GraphPathElement::new("A", "B", 0), 0.0),
            Bucket::new(GraphPathElement::new("A", "C", 0), 0.5),
            Bucket::new(GraphPathElement::new("A", "D", 0), 2.0),
        ];
        assert_eq!(
            hash_fn.choose_nexthop(&buckets, "any").unwrap(),
            GraphPathElement::new("A", "C", 0)
        );

        assert_eq!(
            hash_fn.choose_nexthop(&buckets[..1], "any"),
            Err(RoutingError::NoEligibleNexthop { node: "A".to_string() })
        );
    }
}
