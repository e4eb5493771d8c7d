//! Testing utilities for code built on [`EncryptedVolume`](crate::EncryptedVolume).
//!
//! - **Faults**: [`FaultyVolume`] wraps a volume and injects short writes or
//!   failing primitives, and records how many calls overlapped
//! - **Generators**: deterministic and random content
//! - **Assertions**: content comparison with readable failure messages
//!
//! Enabled for downstream crates with the `testing` feature.

pub mod assertions;
pub mod faulty;
pub mod generators;

pub use assertions::{assert_bytes_equal, assert_volume_file};
pub use faulty::{Fault, FaultyVolume};
pub use generators::{patterned, random_bytes};
