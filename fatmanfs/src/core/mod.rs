// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod checker;
pub mod cursor;
pub mod errors;
pub mod fat;
pub mod macros;
pub mod meta;
pub mod utils;

// === Error types ===
pub use errors::*;

// === Utilities ===
pub use utils::{checksum_utils::*, path_utils::*, time_utils::*};
