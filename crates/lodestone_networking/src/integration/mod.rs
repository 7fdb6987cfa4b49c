//! # Simulation Integration
//!
//! The seam between the session pump and the game simulation. The pump
//! never inspects packet contents itself; it hands decoded packets to the
//! [`Identity`] bound to the session.

mod traits;

pub use traits::Identity;
