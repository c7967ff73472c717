//! Domain types shared by the feature engines, the state machine and the live path.

pub mod ids;
pub mod observation;
pub mod position;

pub use ids::{ConfigHash, TableKey};
pub use observation::PriceObservation;
pub use position::Position;

/// Symbol type alias
pub type Symbol = String;
