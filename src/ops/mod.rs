//! Operations that act on aggregated catalog state: duplicate removal,
//! hardlink collapsing, intersection extraction and the raw read benchmark.

pub mod extract;
pub mod hardlink;
pub mod readbench;
pub mod remove;

pub use extract::extract_unique;
pub use hardlink::{hardlink_copies, HardlinkStats};
pub use readbench::{read_bench, ReadbenchStats};
pub use remove::{remove_copies, RemoveStats};
