// Optimistic mutation engine.
//
// A gesture flows dispatcher -> (propagation, inside one cache transaction)
// -> network -> resolver. The in-flight table keeps at most one pending
// record per (action class, target), which is what makes rapid repeated
// taps safe.

pub mod dispatcher;
pub mod in_flight;
pub mod propagation;
pub mod record;
pub mod resolver;

pub use dispatcher::{Begin, DispatchOutcome, Dispatcher, DispatcherSettings};
pub use in_flight::InFlight;
pub use record::{
    Action, ActionClass, ActionKind, Confirmation, FollowState, MutationRecord, MutationStatus,
    Snapshot,
};
pub use resolver::{Notice, Resolution, Resolver};
