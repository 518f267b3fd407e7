//! Domain model (IDs, states, observations, records, alerts, errors).

pub mod alert;
pub mod errors;
pub mod ids;
pub mod observation;
pub mod record;
pub mod state;

pub use self::alert::{RemoveAction, StockAlert};
pub use self::errors::{ErrorKind, TrackerError};
pub use self::ids::{OwnerId, RunId, SHORT_ID_LEN, ShortId, WatchKey};
pub use self::observation::{Observation, PRICE_NOT_FOUND, TITLE_NOT_FOUND};
pub use self::record::WatchRecord;
pub use self::state::{StockState, WatchTaskState};
