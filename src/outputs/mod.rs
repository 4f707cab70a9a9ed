//! Report files written alongside stdout output.
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── quote-143005.json
//!     └── news-143112.json
//! ```

pub mod json;
