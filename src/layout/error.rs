use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LayoutError {
    #[error(
        "graph is still cyclic after {iterations} greedy reversal iterations ({remaining} nodes left in cycles)"
    )]
    CycleRemovalFailed { remaining: usize, iterations: usize },
    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownNode {
        from: String,
        to: String,
        missing: String,
    },
}
