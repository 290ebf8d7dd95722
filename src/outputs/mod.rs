//! Where stories end up on disk.
//!
//! - [`json`]: one pretty-printed JSON file per story
//! - [`indexes`]: `index.json`, the list of stored stories and the duplicate check
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── index.json
//! ├── 2026-10-15/
//! │   └── my-roommate-charged-me-rent-for-the-hallway.json
//! └── 2026-10-16/
//!     ├── the-egg-ledger.json
//!     └── tifu-by-replying-all-to-the-whole-company.json
//! ```

pub mod indexes;
pub mod json;
