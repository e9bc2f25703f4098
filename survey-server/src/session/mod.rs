//! Explicit state machine for one survey session.
//!
//! This module implements a pure functional state machine for a single
//! participant's pass through the survey. The design separates:
//! - **Phase**: Where the session is (`SessionPhase`)
//! - **Events**: What happened (`Event`)
//! - **Effects**: What to do (`Effect`)
//! - **Transition**: Pure function `(Phase, Event) -> (Phase, Vec<Effect>)`
//!
//! The driver (`Session`) executes effects against the user record
//! gateway and exposes the operations the presentation layer calls.

pub mod driver;
pub mod effect;
pub mod event;
pub mod state;
pub mod transition;

pub use driver::*;
pub use effect::*;
pub use event::*;
pub use state::*;
pub use transition::*;
