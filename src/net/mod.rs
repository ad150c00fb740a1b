//! Low-level network probing

mod probe;

pub use probe::{check_reachable, list_known_devices, NetworkDevice};
