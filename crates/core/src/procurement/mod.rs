//! Procurement routing: offer matching, supplier scoring and the per-supplier
//! task groups the fulfillment layer turns into purchase tasks.

pub mod matcher;
pub mod router;

use thiserror::Error;

pub use matcher::{match_offers, MatchQuality, MatchRule, MatchedOffer};
pub use router::{
    route_lines, route_order, CandidateScore, ManualAssignment, OrderLine, RoutingConfig,
    RoutingLine, RoutingLineDecision, RoutingOutcome, RoutingStrategy, RoutingWeights,
    SupplierTaskGroup, TaskLine,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("order line `{line_id}` has a non-positive pack quantity")]
    InvalidQuantity { line_id: String },
    #[error("order line `{line_id}` appears more than once in the routing pass")]
    DuplicateLine { line_id: String },
    #[error("invalid balanced routing weights: {0}")]
    InvalidWeights(String),
    #[error("estimated cost for order line `{line_id}` exceeds the representable range")]
    CostOverflow { line_id: String },
}
