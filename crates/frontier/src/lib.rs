pub mod queue;
pub mod visited;

pub use queue::Frontier;
pub use visited::VisitedRegistry;
