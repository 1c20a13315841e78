//! Entity resolution across the two upstream key spaces
//!
//! The historical API identifies drivers by a textual ref (`hamilton`), the
//! modern API by car number and acronym (`44`, `HAM`). Countries arrive as free
//! names or demonyms. Everything here maps those onto store ids and codes, and
//! every heuristic match is logged.

pub mod countries;
pub mod index;
pub mod names;

pub use countries::{country_name_for_code, resolve_country_code, resolve_nationality, UNKNOWN_COUNTRY_CODE};
pub use index::{CircuitIndex, ConstructorIndex, DriverIndex, DriverReference};
pub use names::{normalize_driver_name, normalize_event_name};
